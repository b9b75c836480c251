//! Side-by-side comparison of sparsifier strategies on one snapshot
//!
//! The builders share nothing but the read-only snapshot, so they run on the
//! rayon pool when parallelism is enabled, and so does their evaluation
//! against a shared original-graph cut cache. A strategy that refuses the
//! instance (mimicking network over its terminal bound) is reported as
//! skipped; any other failure aborts that strategy only.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::SparsifierConfig;
use crate::error::{Result, SparsifyError};
use crate::evaluate::{DistortionReport, Evaluator};
use crate::graph::Graph;
use crate::sparsify::{build_sparsifier, SparsifierKind, SparsifierResult};
use crate::subset::SubsetSelection;

/// What happened to one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Built and scored
    Evaluated(DistortionReport),
    /// Not run on this instance (never counted as zero distortion)
    Skipped {
        /// Why the strategy declined
        reason: String,
    },
    /// Build or evaluation failed
    Failed {
        /// Error message
        error: String,
    },
}

impl Outcome {
    fn from_error(err: &SparsifyError) -> Self {
        if err.is_skippable() {
            Outcome::Skipped {
                reason: err.to_string(),
            }
        } else {
            Outcome::Failed {
                error: err.to_string(),
            }
        }
    }

    /// The report, if the strategy was evaluated
    pub fn report(&self) -> Option<&DistortionReport> {
        match self {
            Outcome::Evaluated(report) => Some(report),
            Outcome::Skipped { .. } | Outcome::Failed { .. } => None,
        }
    }
}

/// Outcome of every requested strategy on one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Snapshot version
    pub version: u64,
    /// Vertices in the snapshot
    pub num_vertices: usize,
    /// Edges in the snapshot
    pub num_edges: usize,
    /// Terminal count
    pub num_terminals: usize,
    /// Masks each strategy was scored on
    pub selection: SubsetSelection,
    /// Per-strategy outcome
    pub outcomes: BTreeMap<SparsifierKind, Outcome>,
}

impl ComparisonReport {
    /// Outcome for `kind`
    pub fn outcome(&self, kind: SparsifierKind) -> Option<&Outcome> {
        self.outcomes.get(&kind)
    }

    /// Distortion report for `kind`, if it was evaluated
    pub fn report(&self, kind: SparsifierKind) -> Option<&DistortionReport> {
        self.outcomes.get(&kind).and_then(Outcome::report)
    }

    /// Evaluated strategy with the lowest `compression_ratio * (1 + max_distortion)`
    ///
    /// Ties go to the earlier kind (CUT, FLOW, MIMIC).
    pub fn best_tradeoff(&self) -> Option<SparsifierKind> {
        let mut best: Option<(SparsifierKind, f64)> = None;
        for (&kind, outcome) in &self.outcomes {
            let Some(report) = outcome.report() else {
                continue;
            };
            let score = tradeoff_score(report);
            if best.map_or(true, |(_, s)| score < s) {
                best = Some((kind, score));
            }
        }
        best.map(|(kind, _)| kind)
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn tradeoff_score(report: &DistortionReport) -> f64 {
    let distortion = report.max_distortion.max(report.pairwise.max_distortion);
    if distortion.is_infinite() {
        return f64::INFINITY;
    }
    report.compression_ratio * (1.0 + distortion)
}

/// Build every kind on `graph`, in parallel when enabled
pub(crate) fn build_all(
    graph: &Graph,
    kinds: &BTreeSet<SparsifierKind>,
    config: &SparsifierConfig,
) -> Vec<(SparsifierKind, Result<Arc<SparsifierResult>>)> {
    let kinds: Vec<SparsifierKind> = kinds.iter().copied().collect();
    let build = |kind: SparsifierKind| (kind, build_sparsifier(kind, graph, config).map(Arc::new));

    #[cfg(feature = "parallel")]
    {
        if config.use_parallel() {
            return kinds.into_par_iter().map(build).collect();
        }
    }
    kinds.into_iter().map(build).collect()
}

/// Score already built sparsifiers of `graph`
pub(crate) fn evaluate_all(
    graph: &Graph,
    built: &[(SparsifierKind, Result<Arc<SparsifierResult>>)],
    config: &SparsifierConfig,
) -> ComparisonReport {
    let selection = SubsetSelection::for_terminals(graph.terminals().len(), config);
    let evaluator = Evaluator::new(graph, config);
    let score = |(kind, built): &(SparsifierKind, Result<Arc<SparsifierResult>>)| {
        let outcome = match built {
            Ok(result) => match evaluator.evaluate(result, selection) {
                Ok(report) => Outcome::Evaluated(report),
                Err(err) => Outcome::from_error(&err),
            },
            Err(err) => Outcome::from_error(err),
        };
        if let Outcome::Failed { error } = &outcome {
            warn!(kind = %kind, error = %error, "sparsifier failed");
        }
        (*kind, outcome)
    };

    #[cfg(feature = "parallel")]
    let outcomes: BTreeMap<_, _> = if config.use_parallel() {
        built.par_iter().map(score).collect()
    } else {
        built.iter().map(score).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let outcomes: BTreeMap<_, _> = built.iter().map(score).collect();

    ComparisonReport {
        version: graph.version(),
        num_vertices: graph.num_vertices(),
        num_edges: graph.num_edges(),
        num_terminals: graph.terminals().len(),
        selection,
        outcomes,
    }
}

/// Build and score every requested strategy on `graph`
#[instrument(skip(graph, kinds, config), fields(version = graph.version(), n = graph.num_vertices()))]
pub fn compare(
    graph: &Graph,
    kinds: &[SparsifierKind],
    config: &SparsifierConfig,
) -> Result<ComparisonReport> {
    config.validate()?;
    let kinds: BTreeSet<SparsifierKind> = kinds.iter().copied().collect();
    let built = build_all(graph, &kinds, config);
    let report = evaluate_all(graph, &built, config);
    info!(
        evaluated = report.outcomes.values().filter(|o| o.report().is_some()).count(),
        best = ?report.best_tradeoff(),
        "comparison finished"
    );
    Ok(report)
}

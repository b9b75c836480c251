//! Distortion evaluation
//!
//! An [`Evaluator`] is bound to one original snapshot. For each scored subset
//! mask it computes the min cut on the original graph directly and on the
//! sparsifier through its query mapping, and accumulates the relative
//! distortion `|o - s| / o` (0/0 counts as perfect agreement, x/0 as infinite).
//!
//! A mask whose original cut is zero splits terminals that lie in different
//! components. It is still scored (0/0 = 0, x/0 = infinite) and recorded as
//! disconnected; in sampled mode a fresh mask is drawn in its place.
//!
//! Original-graph cut values go through a concurrent cache, so several
//! sparsifiers of the same snapshot can be scored side by side without
//! recomputing them.

use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::SparsifierConfig;
use crate::error::{Result, SparsifyError};
use crate::flow::MinCutEngine;
use crate::graph::Graph;
use crate::sparsify::{CutSparsifierBuilder, SparsifierKind, SparsifierResult};
use crate::subset::{masks_by_popcount, terminal_pairs, MaskSampler, SubsetMask, SubsetSelection};

/// Relative distortion of `sparse` against `original`
///
/// Values at or below `tolerance` count as zero.
pub fn relative_distortion(original: f64, sparse: f64, tolerance: f64) -> f64 {
    if original.abs() <= tolerance {
        if sparse.abs() <= tolerance {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        (original - sparse).abs() / original
    }
}

/// Distortion over terminal pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairwiseReport {
    /// Number of pairs scored
    pub pairs: usize,
    /// Worst relative distortion
    pub max_distortion: f64,
    /// Mean relative distortion
    pub mean_distortion: f64,
}

/// Fidelity and size of one sparsifier against its original graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistortionReport {
    /// Strategy evaluated
    pub kind: SparsifierKind,
    /// Subset masks scored
    pub samples: usize,
    /// Worst relative distortion over the scored masks
    pub max_distortion: f64,
    /// Mean relative distortion over the scored masks
    pub mean_distortion: f64,
    /// Sparsifier edges / original edges
    pub compression_ratio: f64,
    /// Vertices in the sparsifier
    pub vertex_count: usize,
    /// Edges in the sparsifier
    pub edge_count: usize,
    /// Steiner vertices in the sparsifier
    pub steiner_vertices: usize,
    /// Vertices in the original graph
    pub original_vertex_count: usize,
    /// Edges in the original graph
    pub original_edge_count: usize,
    /// Construction wall time reported by the builder
    pub construction_time: Duration,
    /// Scored masks whose original cut is zero (terminal sides in different components)
    pub disconnected_masks: Vec<SubsetMask>,
    /// Replacement masks drawn for disconnected ones in sampled mode
    pub resampled: usize,
    /// Distortion over terminal pairs
    pub pairwise: PairwiseReport,
    /// Documented distortion bound, when the strategy has one
    pub distortion_bound: Option<f64>,
}

impl DistortionReport {
    /// Whether every scored mask and pair agreed within tolerance
    pub fn is_exact(&self, epsilon: f64) -> bool {
        self.max_distortion <= epsilon && self.pairwise.max_distortion <= epsilon
    }

    /// Whether the pairwise distortion stays within the documented bound
    pub fn within_bound(&self) -> bool {
        self.distortion_bound
            .map_or(true, |bound| self.pairwise.max_distortion <= bound)
    }
}

/// Cached original-graph query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CutQuery {
    Subset(SubsetMask),
    Pair(usize, usize),
}

/// Outcome of scoring one mask
#[derive(Debug, Clone, Copy, PartialEq)]
struct MaskScore {
    distortion: f64,
    disconnected: bool,
}

/// Scores sparsifiers against one original snapshot
#[derive(Debug)]
pub struct Evaluator<'g> {
    original: &'g Graph,
    engine: MinCutEngine,
    config: SparsifierConfig,
    cache: DashMap<CutQuery, f64>,
}

impl<'g> Evaluator<'g> {
    /// Create an evaluator for `original`
    pub fn new(original: &'g Graph, config: &SparsifierConfig) -> Self {
        Self {
            original,
            engine: MinCutEngine::from_config(config),
            config: config.clone(),
            cache: DashMap::new(),
        }
    }

    /// The snapshot scored against
    pub fn original(&self) -> &Graph {
        self.original
    }

    /// Number of cached original-graph cut values
    pub fn cached_cuts(&self) -> usize {
        self.cache.len()
    }

    /// Score `result` on the masks picked by `selection`
    ///
    /// In sampled mode every disconnected mask is recorded and a fresh mask is
    /// drawn for it, until `count` connected masks are scored or none are left.
    #[instrument(skip(self, result), fields(kind = %result.kind()))]
    pub fn evaluate(
        &self,
        result: &SparsifierResult,
        selection: SubsetSelection,
    ) -> Result<DistortionReport> {
        let k = self.check_compatible(result)?;
        match selection {
            SubsetSelection::All => self.evaluate_masks(result, &masks_by_popcount(k)),
            SubsetSelection::Sampled { count, seed } => {
                let mut sampler = MaskSampler::new(k, seed);
                let mut masks: Vec<SubsetMask> =
                    std::iter::from_fn(|| sampler.draw()).take(count).collect();
                let mut scored = self.score_masks(result, &masks)?;

                let mut pending = scored.iter().filter(|s| s.disconnected).count();
                let mut resampled = 0;
                while pending > 0 {
                    let Some(mask) = sampler.draw() else { break };
                    resampled += 1;
                    let score = self.score_mask(result, mask)?;
                    if !score.disconnected {
                        pending -= 1;
                    }
                    masks.push(mask);
                    scored.push(score);
                }
                if resampled > 0 {
                    warn!(resampled, "disconnected masks were resampled");
                }
                self.report(result, &masks, &scored, resampled)
            }
        }
    }

    /// Score `result` on exactly `masks`; disconnected masks are recorded, not replaced
    pub fn evaluate_masks(
        &self,
        result: &SparsifierResult,
        masks: &[SubsetMask],
    ) -> Result<DistortionReport> {
        self.check_compatible(result)?;
        let scored = self.score_masks(result, masks)?;
        self.report(result, masks, &scored, 0)
    }

    fn check_compatible(&self, result: &SparsifierResult) -> Result<usize> {
        let k = self.original.terminals().len();
        if result.terminal_image().len() != k {
            return Err(SparsifyError::InvalidTerminalSet(format!(
                "sparsifier has {} terminals, original has {k}",
                result.terminal_image().len()
            )));
        }
        let source = result.metadata().source_version;
        if source != self.original.version() {
            return Err(SparsifyError::InvalidParameter(format!(
                "sparsifier built from snapshot v{source}, evaluated against v{}",
                self.original.version()
            )));
        }
        Ok(k)
    }

    fn cached(&self, query: CutQuery, compute: impl FnOnce() -> Result<f64>) -> Result<f64> {
        if let Some(value) = self.cache.get(&query) {
            return Ok(*value);
        }
        let value = compute()?;
        self.cache.insert(query, value);
        Ok(value)
    }

    fn score_mask(&self, result: &SparsifierResult, mask: SubsetMask) -> Result<MaskScore> {
        let original = self.cached(CutQuery::Subset(mask), || {
            self.engine
                .min_cut_separating_subset(self.original, mask)
                .map(|w| w.value())
        })?;
        let sparse = result.min_cut(&self.engine, mask)?.value();
        let tolerance = self.engine.tolerance(self.original.total_capacity());
        Ok(MaskScore {
            distortion: relative_distortion(original, sparse, tolerance),
            disconnected: original.abs() <= tolerance,
        })
    }

    fn score_masks(&self, result: &SparsifierResult, masks: &[SubsetMask]) -> Result<Vec<MaskScore>> {
        #[cfg(feature = "parallel")]
        {
            if self.config.use_parallel() {
                return masks
                    .par_iter()
                    .map(|&mask| self.score_mask(result, mask))
                    .collect();
            }
        }
        masks.iter().map(|&mask| self.score_mask(result, mask)).collect()
    }

    fn pairwise(&self, result: &SparsifierResult) -> Result<PairwiseReport> {
        let terminals = self.original.terminals();
        let pairs = terminal_pairs(terminals.len(), self.config.pair_sample_limit, self.config.seed);
        let tolerance = self.engine.tolerance(self.original.total_capacity());

        let mut report = PairwiseReport {
            pairs: pairs.len(),
            ..PairwiseReport::default()
        };
        let mut total = 0.0;
        for &(a, b) in &pairs {
            let original = self.cached(CutQuery::Pair(a, b), || {
                let (ta, tb) = terminals
                    .get(a)
                    .zip(terminals.get(b))
                    .ok_or_else(|| SparsifyError::InvalidTerminalSet(format!("pair ({a}, {b})")))?;
                self.engine.min_cut_between(self.original, ta, tb).map(|w| w.value())
            })?;
            let sparse = result.pair_cut(&self.engine, a, b)?.value();
            let distortion = relative_distortion(original, sparse, tolerance);
            report.max_distortion = report.max_distortion.max(distortion);
            total += distortion;
        }
        if !pairs.is_empty() {
            report.mean_distortion = total / pairs.len() as f64;
        }
        Ok(report)
    }

    fn report(
        &self,
        result: &SparsifierResult,
        masks: &[SubsetMask],
        scored: &[MaskScore],
        resampled: usize,
    ) -> Result<DistortionReport> {
        let values: Vec<f64> = scored.iter().map(|s| s.distortion).collect();
        let disconnected_masks: Vec<SubsetMask> = masks
            .iter()
            .zip(scored)
            .filter(|(_, s)| s.disconnected)
            .map(|(&m, _)| m)
            .collect();
        let max_distortion = values.iter().copied().fold(0.0, f64::max);
        let mean_distortion = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        let pairwise = self.pairwise(result)?;
        let metadata = result.metadata();
        let distortion_bound = match result.kind() {
            SparsifierKind::Cut => Some(CutSparsifierBuilder::distortion_bound(
                result.terminal_image().len(),
            )),
            SparsifierKind::Flow | SparsifierKind::Mimic => None,
        };

        debug!(
            samples = values.len(),
            max_distortion,
            pair_max = pairwise.max_distortion,
            "sparsifier evaluated"
        );

        Ok(DistortionReport {
            kind: result.kind(),
            samples: values.len(),
            max_distortion,
            mean_distortion,
            compression_ratio: result.compression_ratio(),
            vertex_count: metadata.vertex_count,
            edge_count: metadata.edge_count,
            steiner_vertices: result.steiner_vertices(),
            original_vertex_count: metadata.original_vertex_count,
            original_edge_count: metadata.original_edge_count,
            construction_time: metadata.construction_time,
            disconnected_masks,
            resampled,
            pairwise,
            distortion_bound,
        })
    }
}

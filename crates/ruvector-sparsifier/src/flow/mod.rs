//! Min-cut / max-flow evaluation engine
//!
//! Every builder and the evaluator talk to the graph through [`MinCutEngine`]:
//!
//! - [`MinCutEngine::min_cut`]: minimum cut separating a source set from a sink set
//! - [`MinCutEngine::min_cut_between`]: the pairwise special case
//! - [`MinCutEngine::min_cut_separating_subset`]: terminal subset vs. its terminal complement,
//!   non-terminals free to fall on either side
//! - [`MinCutEngine::cut_witnesses`]: the previous query for many masks, optionally on the
//!   rayon pool, collected before returning
//! - [`MinCutEngine::cut_function`]: every nontrivial mask, as a [`CutFunction`] table
//!
//! Sets are attached to a super source / super sink with arcs of capacity
//! `total_capacity + 1`. Overlapping sets have no finite cut and fail with
//! [`SparsifyError::DisconnectedTerminals`].

mod dinic;

use roaring::RoaringBitmap;
use tracing::trace;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::{SparsifierConfig, MAX_ENUMERATION_TERMINALS};
use crate::error::{Result, SparsifyError};
use crate::graph::{Edge, Graph};
use crate::subset::{masks_by_popcount, SubsetMask};

use self::dinic::DinicSolver;

/// Residual capacities below this fraction of the capacity scale count as saturated
const RESIDUAL_EPS: f64 = 1e-12;

/// A bipartition (S, V \ S) together with its crossing capacity
///
/// Immutable once produced by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CutWitness {
    source_side: RoaringBitmap,
    value: f64,
    num_vertices: usize,
}

impl CutWitness {
    /// Total capacity crossing the cut
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Whether vertex `v` lies on the source side
    pub fn contains(&self, v: usize) -> bool {
        self.source_side.contains(v as u32)
    }

    /// Source side as a bitmap of arena indices
    pub fn source_side(&self) -> &RoaringBitmap {
        &self.source_side
    }

    /// Source side vertices in ascending order
    pub fn source_vertices(&self) -> impl Iterator<Item = usize> + '_ {
        self.source_side.iter().map(|v| v as usize)
    }

    /// Sink side vertices in ascending order
    pub fn sink_vertices(&self) -> Vec<usize> {
        (0..self.num_vertices).filter(|&v| !self.contains(v)).collect()
    }

    /// Number of vertices in the graph the witness was computed on
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Edges of `graph` crossing the cut
    pub fn cut_edges<'g>(&'g self, graph: &'g Graph) -> impl Iterator<Item = &'g Edge> + 'g {
        graph.edges().iter().filter(move |e| e.crosses(|v| self.contains(v)))
    }
}

/// Terminal cut function c(S) for every mask of a k-terminal graph
#[derive(Debug, Clone, PartialEq)]
pub struct CutFunction {
    k: usize,
    values: Vec<f64>,
}

impl CutFunction {
    /// Assemble from witnesses aligned with `masks`; the empty and full set map to 0
    pub fn from_witnesses(k: usize, masks: &[SubsetMask], witnesses: &[CutWitness]) -> Self {
        let mut values = vec![0.0; 1usize << k];
        for (&mask, witness) in masks.iter().zip(witnesses) {
            values[mask as usize] = witness.value();
        }
        Self { k, values }
    }

    /// Number of terminals
    pub fn num_terminals(&self) -> usize {
        self.k
    }

    /// c(S) for `mask`
    pub fn value(&self, mask: SubsetMask) -> f64 {
        self.values.get(mask as usize).copied().unwrap_or(0.0)
    }
}

/// Exact max-flow / min-cut engine with a relative tolerance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinCutEngine {
    epsilon: f64,
}

impl Default for MinCutEngine {
    fn default() -> Self {
        Self { epsilon: 1e-9 }
    }
}

impl MinCutEngine {
    /// Create an engine with relative tolerance `epsilon`
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Engine using the configured tolerance
    pub fn from_config(config: &SparsifierConfig) -> Self {
        Self::new(config.epsilon)
    }

    /// Relative tolerance
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Absolute tolerance for values of magnitude `scale`
    pub fn tolerance(&self, scale: f64) -> f64 {
        self.epsilon * scale.abs().max(1.0)
    }

    /// Whether two cut values agree within tolerance
    pub fn approx_eq(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.tolerance(a.abs().max(b.abs()))
    }

    /// Minimum cut separating `source` from `sink` (arena indices)
    pub fn min_cut(&self, graph: &Graph, source: &[usize], sink: &[usize]) -> Result<CutWitness> {
        let n = graph.num_vertices();
        if source.is_empty() || sink.is_empty() {
            return Err(SparsifyError::InvalidTerminalSet(
                "cut query needs a non-empty source set and sink set".to_string(),
            ));
        }
        if let Some(&v) = source.iter().chain(sink).find(|&&v| v >= n) {
            return Err(SparsifyError::InvalidTerminalSet(format!(
                "vertex index {v} out of range for {n} vertices"
            )));
        }

        let mut is_source = vec![false; n];
        for &v in source {
            is_source[v] = true;
        }
        if sink.iter().any(|&v| is_source[v]) {
            return Err(SparsifyError::DisconnectedTerminals {
                capacity: graph.total_capacity(),
            });
        }

        let scale = graph.total_capacity() + 1.0;
        let (super_source, super_sink) = (n, n + 1);
        let mut solver = DinicSolver::new(n + 2, RESIDUAL_EPS * scale);
        for edge in graph.edges() {
            solver.add_undirected(edge.source, edge.target, edge.capacity);
        }
        for &v in source {
            solver.add_arc(super_source, v, scale);
        }
        for &v in sink {
            solver.add_arc(v, super_sink, scale);
        }

        let flow = solver.max_flow(super_source, super_sink);
        let side = solver.source_side(super_source);
        let value = graph.cut_capacity(|v| side[v]);

        if value.is_nan() || value < 0.0 {
            return Err(SparsifyError::inconsistent(value, "min-cut witness"));
        }
        if (flow - value).abs() > self.tolerance(scale) {
            return Err(SparsifyError::inconsistent(
                value,
                format!("max-flow/min-cut duality (flow {flow})"),
            ));
        }

        let source_side: RoaringBitmap = (0..n).filter(|&v| side[v]).map(|v| v as u32).collect();
        trace!(
            sources = source.len(),
            sinks = sink.len(),
            value,
            "min cut computed"
        );

        Ok(CutWitness {
            source_side,
            value,
            num_vertices: n,
        })
    }

    /// Minimum cut separating two vertices
    pub fn min_cut_between(&self, graph: &Graph, a: usize, b: usize) -> Result<CutWitness> {
        self.min_cut(graph, &[a], &[b])
    }

    /// Minimum cut separating the terminals in `mask` from the remaining terminals
    pub fn min_cut_separating_subset(&self, graph: &Graph, mask: SubsetMask) -> Result<CutWitness> {
        let terminals = graph.terminals();
        let full = terminals.full_mask();
        if mask == 0 || mask & !full != 0 || mask == full {
            return Err(SparsifyError::InvalidTerminalSet(format!(
                "mask {mask:#b} is not a nontrivial subset of {} terminals",
                terminals.len()
            )));
        }
        let (inside, outside) = terminals.split(mask);
        self.min_cut(graph, &inside, &outside)
    }

    /// Subset cuts for every mask, in mask order
    ///
    /// Queries are independent; with `parallel` they run on the rayon pool and
    /// the call returns only once every result is collected.
    pub fn cut_witnesses(
        &self,
        graph: &Graph,
        masks: &[SubsetMask],
        parallel: bool,
    ) -> Result<Vec<CutWitness>> {
        #[cfg(feature = "parallel")]
        {
            if parallel {
                return masks
                    .par_iter()
                    .map(|&mask| self.min_cut_separating_subset(graph, mask))
                    .collect();
            }
        }
        #[cfg(not(feature = "parallel"))]
        let _ = parallel;

        masks
            .iter()
            .map(|&mask| self.min_cut_separating_subset(graph, mask))
            .collect()
    }

    /// The full terminal cut function, one min-cut per nontrivial mask
    pub fn cut_function(&self, graph: &Graph, parallel: bool) -> Result<CutFunction> {
        let k = graph.terminals().len();
        if k > MAX_ENUMERATION_TERMINALS {
            return Err(SparsifyError::TerminalCountExceeded {
                terminals: k,
                limit: MAX_ENUMERATION_TERMINALS,
            });
        }
        let masks = masks_by_popcount(k);
        let witnesses = self.cut_witnesses(graph, &masks, parallel)?;
        Ok(CutFunction::from_witnesses(k, &masks, &witnesses))
    }
}

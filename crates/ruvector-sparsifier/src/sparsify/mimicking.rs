//! Exact mimicking networks
//!
//! The terminal cut function is computed for all `2^k - 2` nontrivial masks
//! (in parallel, collected before anything reads it), then resolved in
//! increasing popcount order:
//!
//! - Pair masks fix every terminal-only capacity:
//!   `x_ij = (c({i}) + c({j}) - c({i, j})) / 2`
//! - Larger masks are checked against the cut those capacities induce
//!
//! When some mask is not reproduced no graph on the terminals alone can be
//! exact, and the builder contracts the original graph instead: vertices that
//! fall on the same side of every witness cut are merged (Hagerup, Katajainen,
//! Nishimura, Ragde). Every witness cut survives the contraction and no cut
//! can shrink, so both paths reproduce c exactly.
//!
//! A terminal-only network has at most `2^(k-1) - 1` edges
//! ([`MimickingNetworkBuilder::terminal_edge_bound`]). The contracted network
//! is bounded only by the original graph and may exceed that count.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::config::SparsifierConfig;
use crate::error::{Result, SparsifyError};
use crate::flow::{CutFunction, CutWitness, MinCutEngine};
use crate::graph::{Graph, VertexId, Weight};
use crate::subset::{masks_by_popcount, SubsetMask};

use super::{
    terminal_ids, EdgeAccumulator, ResultAssembly, SparsifierBuilder, SparsifierKind,
    SparsifierResult,
};

/// Builds exact mimicking networks for small terminal sets
#[derive(Debug, Clone)]
pub struct MimickingNetworkBuilder {
    config: SparsifierConfig,
    engine: MinCutEngine,
}

impl MimickingNetworkBuilder {
    /// Create a builder
    pub fn new(config: SparsifierConfig) -> Self {
        let engine = MinCutEngine::from_config(&config);
        Self { config, engine }
    }

    /// Builder configuration
    pub fn config(&self) -> &SparsifierConfig {
        &self.config
    }

    /// Edge bound of a terminal-only network on `k` terminals: `2^(k-1) - 1`
    pub fn terminal_edge_bound(k: usize) -> usize {
        match k {
            0 => 0,
            k => (1usize << (k - 1)) - 1,
        }
    }

    fn check_terminal_count(&self, graph: &Graph) -> Result<usize> {
        let k = graph.terminals().len();
        let limit = self.config.max_mimic_terminals;
        if k > limit {
            return Err(SparsifyError::TerminalCountExceeded {
                terminals: k,
                limit,
            });
        }
        Ok(k)
    }

    /// Capacities of a terminal-only network reproducing `function`, if one exists
    fn solve_terminal_only(
        &self,
        function: &CutFunction,
        masks: &[SubsetMask],
        tolerance: f64,
    ) -> Option<Vec<(usize, usize, Weight)>> {
        let k = function.num_terminals();
        let mut capacity = vec![vec![0.0; k]; k];
        for i in 0..k {
            for j in (i + 1)..k {
                let pair = (1u64 << i) | (1u64 << j);
                let x = (function.value(1u64 << i) + function.value(1u64 << j)
                    - function.value(pair))
                    / 2.0;
                if x < -tolerance {
                    debug!(i, j, x, "negative pair capacity");
                    return None;
                }
                if x > tolerance {
                    capacity[i][j] = x;
                    capacity[j][i] = x;
                }
            }
        }

        for &mask in masks {
            let mut induced = 0.0;
            for i in (0..k).filter(|&i| mask & (1u64 << i) != 0) {
                for j in (0..k).filter(|&j| mask & (1u64 << j) == 0) {
                    induced += capacity[i][j];
                }
            }
            if (induced - function.value(mask)).abs() > tolerance {
                debug!(
                    mask,
                    induced,
                    expected = function.value(mask),
                    "terminal-only network misses a subset cut"
                );
                return None;
            }
        }

        let mut edges = Vec::new();
        for (i, row) in capacity.iter().enumerate() {
            for (j, &x) in row.iter().enumerate().skip(i + 1) {
                if x > 0.0 {
                    edges.push((i, j, x));
                }
            }
        }
        Some(edges)
    }
}

/// Partition vertices by their side in every witness
///
/// Returns the class of each vertex and the output id of each class. Terminal
/// classes come first in terminal order, the rest by their smallest vertex.
fn signature_classes(graph: &Graph, witnesses: &[CutWitness]) -> (Vec<usize>, Vec<VertexId>) {
    let n = graph.num_vertices();
    let mut class = vec![0usize; n];
    let mut count = 1;
    for witness in witnesses {
        let mut split: HashMap<(usize, bool), usize> = HashMap::with_capacity(count * 2);
        for (v, c) in class.iter_mut().enumerate() {
            let next = split.len();
            *c = *split.entry((*c, witness.contains(v))).or_insert(next);
        }
        count = split.len();
    }

    let terminals = graph.terminals();
    let mut order = vec![usize::MAX; count];
    let mut next = 0;
    for t in terminals.iter() {
        order[class[t]] = next;
        next += 1;
    }
    let mut ids = terminal_ids(graph);
    for v in 0..n {
        if order[class[v]] == usize::MAX {
            order[class[v]] = next;
            next += 1;
            ids.push(graph.vertex_id(v));
        }
    }
    (class.into_iter().map(|c| order[c]).collect(), ids)
}

impl SparsifierBuilder for MimickingNetworkBuilder {
    fn kind(&self) -> SparsifierKind {
        SparsifierKind::Mimic
    }

    #[instrument(skip(self, graph), fields(n = graph.num_vertices(), k = graph.terminals().len()))]
    fn build(&self, graph: &Graph) -> Result<SparsifierResult> {
        let started = Instant::now();
        let k = self.check_terminal_count(graph)?;

        let masks = masks_by_popcount(k);
        let witnesses = self
            .engine
            .cut_witnesses(graph, &masks, self.config.use_parallel())?;
        let function = CutFunction::from_witnesses(k, &masks, &witnesses);
        let tolerance = self.engine.tolerance(graph.total_capacity());
        debug!(masks = masks.len(), "terminal cut function computed");

        let assembly = match self.solve_terminal_only(&function, &masks, tolerance) {
            Some(edges) => {
                debug!(
                    edges = edges.len(),
                    bound = Self::terminal_edge_bound(k),
                    "terminal-only mimicking network"
                );
                ResultAssembly {
                    kind: SparsifierKind::Mimic,
                    original: graph,
                    started,
                    ids: terminal_ids(graph),
                    edges,
                    vertex_map: None,
                    synthetic_edges: Vec::new(),
                }
            }
            None => {
                let (class, ids) = signature_classes(graph, &witnesses);
                let mut acc = EdgeAccumulator::default();
                for edge in graph.edges() {
                    acc.add(class[edge.source], class[edge.target], edge.capacity);
                }
                let edges = acc.into_edges(0.0);
                info!(
                    steiner = ids.len() - k,
                    edges = edges.len(),
                    "no terminal-only mimicking network, contracted by cut signature"
                );
                ResultAssembly {
                    kind: SparsifierKind::Mimic,
                    original: graph,
                    started,
                    ids,
                    edges,
                    vertex_map: Some(class),
                    synthetic_edges: Vec::new(),
                }
            }
        };
        assembly.finish()
    }
}

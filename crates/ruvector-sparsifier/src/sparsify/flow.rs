//! Flow sparsifier on the terminal set
//!
//! [`FlowMethod::CutTree`] builds a cut-equivalent tree over the terminals
//! (k - 1 max-flows) and outputs it as the sparsifier: every terminal pair's
//! min cut is exact, larger subsets are approximate.
//!
//! [`FlowMethod::SampledTrees`] averages random capacity-biased spanning trees:
//! each sample partitions the vertices by nearest terminal along the tree and
//! charges every crossing original edge to its terminal pair.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use rand::prelude::*;
use rand::rngs::StdRng;
use tracing::{debug, instrument};

use crate::config::{FlowMethod, SparsifierConfig};
use crate::error::{Result, SparsifyError};
use crate::flow::MinCutEngine;
use crate::graph::{Graph, Weight};
use crate::tree::CutTree;

use super::{
    terminal_ids, EdgeAccumulator, ResultAssembly, SparsifierBuilder, SparsifierKind,
    SparsifierResult, UnionFind,
};

/// Builds flow sparsifiers on exactly the k terminals
#[derive(Debug, Clone)]
pub struct FlowSparsifierBuilder {
    config: SparsifierConfig,
    engine: MinCutEngine,
}

impl FlowSparsifierBuilder {
    /// Create a builder
    pub fn new(config: SparsifierConfig) -> Self {
        let engine = MinCutEngine::from_config(&config);
        Self { config, engine }
    }

    /// Builder configuration
    pub fn config(&self) -> &SparsifierConfig {
        &self.config
    }

    /// Cut-equivalent tree over the terminals; node `i` is terminal position `i`
    pub fn cut_tree(&self, graph: &Graph) -> Result<CutTree> {
        CutTree::build(&self.engine, graph, graph.terminals().as_slice())
    }

    fn tree_edges(&self, graph: &Graph) -> Result<Vec<(usize, usize, Weight)>> {
        let tree = self.cut_tree(graph)?;
        let mut edges = Vec::with_capacity(tree.len().saturating_sub(1));
        for (node, parent, weight) in tree.edges() {
            if weight.is_nan() || weight < 0.0 {
                return Err(SparsifyError::inconsistent(weight, "flow sparsifier tree edge"));
            }
            // zero edges separate terminal components and stay out of the graph
            if weight > 0.0 {
                edges.push((node, parent, weight));
            }
        }
        Ok(edges)
    }

    fn sampled_edges(
        &self,
        graph: &Graph,
        samples: Option<usize>,
        jitter: f64,
    ) -> Vec<(usize, usize, Weight)> {
        let k = graph.terminals().len();
        let samples = samples.unwrap_or_else(|| default_samples(k));
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let share = 1.0 / samples as f64;

        let mut acc = EdgeAccumulator::default();
        for _ in 0..samples {
            let tree = random_spanning_tree(graph, jitter, &mut rng);
            let assign = nearest_terminal(graph, &tree);
            for edge in graph.edges() {
                if let (Some(a), Some(b)) = (assign[edge.source], assign[edge.target]) {
                    acc.add(a, b, edge.capacity * share);
                }
            }
        }
        acc.into_edges(0.0)
    }
}

/// `8 * ceil(log2 k)` trees
fn default_samples(k: usize) -> usize {
    let k = k.max(2) as f64;
    8 * k.log2().ceil() as usize
}

/// Minimum spanning forest under length `(1 / capacity) * (1 + U(0, jitter))`,
/// as per-vertex adjacency of (neighbor, edge position)
fn random_spanning_tree(graph: &Graph, jitter: f64, rng: &mut StdRng) -> Vec<Vec<(usize, usize)>> {
    let mut order: Vec<(f64, usize)> = graph
        .edges()
        .iter()
        .enumerate()
        .map(|(pos, e)| ((1.0 / e.capacity) * (1.0 + rng.gen::<f64>() * jitter), pos))
        .collect();
    order.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut forest = UnionFind::new(graph.num_vertices());
    let mut tree = vec![Vec::new(); graph.num_vertices()];
    for (_, pos) in order {
        let edge = &graph.edges()[pos];
        if forest.union(edge.source, edge.target) {
            tree[edge.source].push((edge.target, pos));
            tree[edge.target].push((edge.source, pos));
        }
    }
    tree
}

/// Heap entry ordered by distance, then vertex, then terminal position
#[derive(Debug, Clone, Copy, PartialEq)]
struct Reach {
    dist: f64,
    vertex: usize,
    terminal: usize,
}

impl Eq for Reach {}

impl Ord for Reach {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for a min-heap
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.vertex.cmp(&self.vertex))
            .then_with(|| other.terminal.cmp(&self.terminal))
    }
}

impl PartialOrd for Reach {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Nearest terminal position of every vertex along the tree (length 1 / capacity)
///
/// Vertices in a tree component without terminals stay `None`.
fn nearest_terminal(graph: &Graph, tree: &[Vec<(usize, usize)>]) -> Vec<Option<usize>> {
    let n = graph.num_vertices();
    let mut dist = vec![f64::INFINITY; n];
    let mut assign = vec![None; n];
    let mut heap = BinaryHeap::new();

    for (pos, t) in graph.terminals().iter().enumerate() {
        dist[t] = 0.0;
        heap.push(Reach {
            dist: 0.0,
            vertex: t,
            terminal: pos,
        });
    }

    while let Some(Reach {
        dist: d,
        vertex: u,
        terminal,
    }) = heap.pop()
    {
        if d > dist[u] || assign[u].is_some() {
            continue;
        }
        assign[u] = Some(terminal);
        for &(v, pos) in &tree[u] {
            let next = d + 1.0 / graph.edges()[pos].capacity;
            if next < dist[v] {
                dist[v] = next;
                heap.push(Reach {
                    dist: next,
                    vertex: v,
                    terminal,
                });
            }
        }
    }
    assign
}

impl SparsifierBuilder for FlowSparsifierBuilder {
    fn kind(&self) -> SparsifierKind {
        SparsifierKind::Flow
    }

    #[instrument(skip(self, graph), fields(n = graph.num_vertices(), k = graph.terminals().len()))]
    fn build(&self, graph: &Graph) -> Result<SparsifierResult> {
        let started = Instant::now();
        let edges = match self.config.flow_method {
            FlowMethod::CutTree => self.tree_edges(graph)?,
            FlowMethod::SampledTrees { samples, jitter } => {
                self.sampled_edges(graph, samples, jitter)
            }
        };
        debug!(
            edges = edges.len(),
            method = ?self.config.flow_method,
            "flow sparsifier built"
        );

        ResultAssembly {
            kind: SparsifierKind::Flow,
            original: graph,
            started,
            ids: terminal_ids(graph),
            edges,
            vertex_map: None,
            synthetic_edges: Vec::new(),
        }
        .finish()
    }
}

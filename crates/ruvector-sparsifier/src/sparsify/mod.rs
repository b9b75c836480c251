//! Terminal sparsifiers
//!
//! Three independent strategies compress a graph onto its terminals:
//!
//! 1. **Connected 0-extension** ([`extension`]): retract every vertex onto a terminal
//!    and contract; cuts are approximated within the 0-extension bound
//! 2. **Flow sparsifier** ([`flow`]): cut-equivalent tree on the terminals; pairwise exact
//! 3. **Mimicking network** ([`mimicking`]): reproduces every terminal subset cut exactly
//!
//! All of them return a [`SparsifierResult`] whose graph keeps the original
//! terminal order, so a terminal subset mask means the same thing on both graphs.
//!
//! # Example
//!
//! ```rust
//! use ruvector_sparsifier::graph::load_graph;
//! use ruvector_sparsifier::sparsify::{build_sparsifier, SparsifierKind};
//! use ruvector_sparsifier::{MinCutEngine, SparsifierConfig};
//!
//! let graph = load_graph(
//!     [0, 1, 2, 3],
//!     [(0, 1, 2.0), (0, 2, 2.0), (1, 3, 2.0), (2, 3, 2.0), (1, 2, 1.0)],
//!     [0, 3],
//! )
//! .unwrap();
//!
//! let config = SparsifierConfig::default();
//! let mimic = build_sparsifier(SparsifierKind::Mimic, &graph, &config).unwrap();
//! assert_eq!(mimic.num_vertices(), 2);
//! assert_eq!(mimic.num_edges(), 1);
//!
//! let engine = MinCutEngine::default();
//! let cut = mimic.min_cut(&engine, 0b01).unwrap();
//! assert!((cut.value() - 4.0).abs() < 1e-9);
//! ```

pub mod extension;
pub mod flow;
pub mod mimicking;

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::SparsifierConfig;
use crate::error::{Result, SparsifyError};
use crate::flow::{CutWitness, MinCutEngine};
use crate::graph::{Graph, VertexId, Weight};
use crate::subset::SubsetMask;

pub use extension::CutSparsifierBuilder;
pub use flow::FlowSparsifierBuilder;
pub use mimicking::MimickingNetworkBuilder;

/// Which sparsification strategy to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SparsifierKind {
    /// Connected 0-extension cut sparsifier
    Cut,
    /// Cut-equivalent tree flow sparsifier
    Flow,
    /// Exact mimicking network
    Mimic,
}

impl SparsifierKind {
    /// Every kind, in report order
    pub const ALL: [SparsifierKind; 3] = [
        SparsifierKind::Cut,
        SparsifierKind::Flow,
        SparsifierKind::Mimic,
    ];

    /// Short display name
    pub fn name(&self) -> &'static str {
        match self {
            SparsifierKind::Cut => "cut-0-extension",
            SparsifierKind::Flow => "flow-cut-tree",
            SparsifierKind::Mimic => "mimicking-network",
        }
    }
}

impl fmt::Display for SparsifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An auxiliary edge added to reconnect the quotient graph
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticEdge {
    /// Terminal position on one side
    pub a: usize,
    /// Terminal position on the other side
    pub b: usize,
    /// Bridging min-cut value in the original graph
    pub capacity: Weight,
    /// Whether the edge was inserted into the output graph (capacity above tolerance)
    pub inserted: bool,
}

/// Construction metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparsifierMetadata {
    /// Wall-clock construction time
    pub construction_time: Duration,
    /// Vertices in the output graph
    pub vertex_count: usize,
    /// Edges in the output graph
    pub edge_count: usize,
    /// Vertices in the original graph
    pub original_vertex_count: usize,
    /// Edges in the original graph
    pub original_edge_count: usize,
    /// Version of the snapshot the sparsifier was built from
    pub source_version: u64,
}

/// Output of a sparsifier builder
///
/// The output graph lists the k terminals first, in original terminal order,
/// followed by any auxiliary Steiner vertices.
#[derive(Debug, Clone, Serialize)]
pub struct SparsifierResult {
    kind: SparsifierKind,
    graph: Graph,
    /// Terminal position -> output vertex
    terminal_image: Vec<usize>,
    /// Original vertex -> output vertex, when the sparsifier is a contraction
    vertex_map: Option<Vec<usize>>,
    steiner_vertices: usize,
    synthetic_edges: Vec<SyntheticEdge>,
    metadata: SparsifierMetadata,
}

impl SparsifierResult {
    /// Strategy that produced this result
    pub fn kind(&self) -> SparsifierKind {
        self.kind
    }

    /// The sparsifier graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Number of vertices in the sparsifier
    pub fn num_vertices(&self) -> usize {
        self.graph.num_vertices()
    }

    /// Number of edges in the sparsifier
    pub fn num_edges(&self) -> usize {
        self.graph.num_edges()
    }

    /// Output vertex of every terminal position
    pub fn terminal_image(&self) -> &[usize] {
        &self.terminal_image
    }

    /// Original vertex -> output vertex (0-extension retraction or mimicking clusters)
    pub fn vertex_map(&self) -> Option<&[usize]> {
        self.vertex_map.as_deref()
    }

    /// Number of non-terminal vertices in the output
    pub fn steiner_vertices(&self) -> usize {
        self.steiner_vertices
    }

    /// Auxiliary reconnecting edges
    pub fn synthetic_edges(&self) -> &[SyntheticEdge] {
        &self.synthetic_edges
    }

    /// Construction metadata
    pub fn metadata(&self) -> &SparsifierMetadata {
        &self.metadata
    }

    /// Map an original-graph subset query onto output vertex sets
    pub fn query(&self, mask: SubsetMask) -> (Vec<usize>, Vec<usize>) {
        let mut inside = Vec::new();
        let mut outside = Vec::new();
        for (pos, &v) in self.terminal_image.iter().enumerate() {
            if mask & (1u64 << pos) != 0 {
                inside.push(v);
            } else {
                outside.push(v);
            }
        }
        (inside, outside)
    }

    /// The sparsifier's answer to a terminal subset cut query
    pub fn min_cut(&self, engine: &MinCutEngine, mask: SubsetMask) -> Result<CutWitness> {
        let full = (1u64 << self.terminal_image.len()) - 1;
        if mask == 0 || mask & !full != 0 || mask == full {
            return Err(SparsifyError::InvalidTerminalSet(format!(
                "mask {mask:#b} is not a nontrivial subset of {} terminals",
                self.terminal_image.len()
            )));
        }
        let (inside, outside) = self.query(mask);
        engine.min_cut(&self.graph, &inside, &outside)
    }

    /// The sparsifier's answer to a terminal pair cut query
    pub fn pair_cut(&self, engine: &MinCutEngine, a: usize, b: usize) -> Result<CutWitness> {
        let image = |pos: usize| {
            self.terminal_image.get(pos).copied().ok_or_else(|| {
                SparsifyError::InvalidTerminalSet(format!("terminal position {pos} out of range"))
            })
        };
        engine.min_cut(&self.graph, &[image(a)?], &[image(b)?])
    }

    /// Edge count relative to the original graph
    pub fn compression_ratio(&self) -> f64 {
        if self.metadata.original_edge_count == 0 {
            return 1.0;
        }
        self.num_edges() as f64 / self.metadata.original_edge_count as f64
    }
}

/// A sparsification strategy
pub trait SparsifierBuilder {
    /// Strategy implemented by this builder
    fn kind(&self) -> SparsifierKind;

    /// Build a sparsifier from a snapshot
    fn build(&self, graph: &Graph) -> Result<SparsifierResult>;
}

/// Build a sparsifier of the requested kind
pub fn build_sparsifier(
    kind: SparsifierKind,
    graph: &Graph,
    config: &SparsifierConfig,
) -> Result<SparsifierResult> {
    config.validate()?;
    match kind {
        SparsifierKind::Cut => CutSparsifierBuilder::new(config.clone()).build(graph),
        SparsifierKind::Flow => FlowSparsifierBuilder::new(config.clone()).build(graph),
        SparsifierKind::Mimic => MimickingNetworkBuilder::new(config.clone()).build(graph),
    }
}

/// Accumulates capacities between output vertices in a deterministic order
#[derive(Debug, Default)]
pub(crate) struct EdgeAccumulator {
    capacities: BTreeMap<(usize, usize), Weight>,
}

impl EdgeAccumulator {
    pub(crate) fn add(&mut self, u: usize, v: usize, capacity: Weight) {
        if u == v {
            return;
        }
        let key = if u < v { (u, v) } else { (v, u) };
        *self.capacities.entry(key).or_insert(0.0) += capacity;
    }

    /// Edges above `threshold`, ordered by endpoint pair
    pub(crate) fn into_edges(self, threshold: Weight) -> Vec<(usize, usize, Weight)> {
        self.capacities
            .into_iter()
            .filter(|&(_, c)| c > threshold)
            .map(|((u, v), c)| (u, v, c))
            .collect()
    }
}

/// Disjoint-set forest with path halving; `union` keeps the smaller root
#[derive(Debug, Clone)]
pub(crate) struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    pub(crate) fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets of `a` and `b`; false if they were already joined
    pub(crate) fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        self.parent[ra.max(rb)] = ra.min(rb);
        true
    }
}

/// Shared tail of every builder: validate the output graph and stamp metadata
pub(crate) struct ResultAssembly<'a> {
    pub(crate) kind: SparsifierKind,
    pub(crate) original: &'a Graph,
    pub(crate) started: Instant,
    /// External ids of the output vertices; the first k are the terminals
    pub(crate) ids: Vec<VertexId>,
    pub(crate) edges: Vec<(usize, usize, Weight)>,
    pub(crate) vertex_map: Option<Vec<usize>>,
    pub(crate) synthetic_edges: Vec<SyntheticEdge>,
}

impl ResultAssembly<'_> {
    pub(crate) fn finish(self) -> Result<SparsifierResult> {
        let k = self.original.terminals().len();
        let steiner_vertices = self.ids.len().saturating_sub(k);
        let terminal_image: Vec<usize> = (0..k).collect();
        let graph = Graph::from_indexed(
            self.ids,
            self.edges,
            terminal_image.clone(),
            self.original.version(),
        )?;

        let metadata = SparsifierMetadata {
            construction_time: self.started.elapsed(),
            vertex_count: graph.num_vertices(),
            edge_count: graph.num_edges(),
            original_vertex_count: self.original.num_vertices(),
            original_edge_count: self.original.num_edges(),
            source_version: self.original.version(),
        };

        Ok(SparsifierResult {
            kind: self.kind,
            graph,
            terminal_image,
            vertex_map: self.vertex_map,
            steiner_vertices,
            synthetic_edges: self.synthetic_edges,
            metadata,
        })
    }
}

/// External ids of the terminals, in terminal order
pub(crate) fn terminal_ids(graph: &Graph) -> Vec<VertexId> {
    graph.terminals().iter().map(|t| graph.vertex_id(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::load_graph;

    fn diamond() -> Graph {
        load_graph(
            [0, 1, 2, 3],
            [(0, 1, 2.0), (0, 2, 2.0), (1, 3, 2.0), (2, 3, 2.0), (1, 2, 1.0)],
            [0, 3],
        )
        .unwrap()
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(SparsifierKind::Cut.to_string(), "cut-0-extension");
        assert_eq!(SparsifierKind::ALL.len(), 3);
        assert!(SparsifierKind::Cut < SparsifierKind::Mimic);
    }

    #[test]
    fn test_edge_accumulator() {
        let mut acc = EdgeAccumulator::default();
        acc.add(2, 1, 1.5);
        acc.add(1, 2, 0.5);
        acc.add(0, 0, 9.0);
        acc.add(0, 3, 1e-12);
        assert_eq!(acc.into_edges(1e-9), vec![(1, 2, 2.0)]);
    }

    #[test]
    fn test_union_find() {
        let mut sets = UnionFind::new(5);
        assert!(sets.union(3, 1));
        assert!(sets.union(4, 3));
        assert!(!sets.union(1, 4));
        assert_eq!(sets.find(4), 1);
        assert_ne!(sets.find(0), sets.find(2));
    }

    #[test]
    fn test_build_every_kind() {
        let g = diamond();
        let config = SparsifierConfig::default();
        let engine = MinCutEngine::default();
        for kind in SparsifierKind::ALL {
            let result = build_sparsifier(kind, &g, &config).unwrap();
            assert_eq!(result.kind(), kind);
            assert_eq!(result.num_vertices(), 2);
            assert_eq!(result.terminal_image(), &[0, 1]);
            assert_eq!(result.metadata().original_edge_count, 5);
            let cut = result.min_cut(&engine, 0b01).unwrap();
            assert!((cut.value() - 4.0).abs() < 1e-9, "{kind}");
            assert!((result.compression_ratio() - 0.2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_query_mapping() {
        let g = load_graph([0, 1, 2, 3], [(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0)], [3, 0, 2]).unwrap();
        let result = build_sparsifier(SparsifierKind::Flow, &g, &SparsifierConfig::default()).unwrap();
        assert_eq!(result.query(0b101), (vec![0, 2], vec![1]));
        assert_eq!(result.graph().vertex_ids(), &[3, 0, 2]);
        assert!(result.min_cut(&MinCutEngine::default(), 0b111).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SparsifierConfig {
            epsilon: -1.0,
            ..SparsifierConfig::default()
        };
        let result = build_sparsifier(SparsifierKind::Cut, &diamond(), &config);
        assert!(matches!(result, Err(SparsifyError::InvalidParameter(_))));
    }
}

//! Graph snapshots for terminal sparsification
//!
//! A [`Graph`] is an immutable snapshot:
//! - Vertices live in an arena indexed `0..n`, external ids are kept alongside
//! - Edges are undirected, keyed by canonical index pairs, capacities strictly positive
//! - Parallel edges are merged by summing capacity, self-loops are rejected
//! - The ordered [`TerminalSet`] fixes the bit position of every terminal in a subset mask
//!
//! Updates never mutate a snapshot; [`Graph::with_capacity_added`] and
//! [`Graph::without_edge`] return a new graph with `version + 1`.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SparsifyError};

/// External vertex identifier
pub type VertexId = u64;

/// Edge capacity type
pub type Weight = f64;

/// An undirected capacitated edge between two arena indices (`source < target`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Smaller endpoint index
    pub source: usize,
    /// Larger endpoint index
    pub target: usize,
    /// Capacity of the edge
    pub capacity: Weight,
}

impl Edge {
    /// Create a new edge, normalizing endpoint order
    pub fn new(u: usize, v: usize, capacity: Weight) -> Self {
        let (source, target) = canonical_key(u, v);
        Self {
            source,
            target,
            capacity,
        }
    }

    /// Get the other endpoint of the edge given one endpoint
    pub fn other(&self, v: usize) -> Option<usize> {
        if self.source == v {
            Some(self.target)
        } else if self.target == v {
            Some(self.source)
        } else {
            None
        }
    }

    /// Whether the edge crosses the bipartition described by `side`
    pub fn crosses(&self, side: impl Fn(usize) -> bool) -> bool {
        side(self.source) != side(self.target)
    }
}

/// Statistics about a graph snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of vertices
    pub num_vertices: usize,
    /// Number of edges
    pub num_edges: usize,
    /// Number of terminals
    pub num_terminals: usize,
    /// Sum of all edge capacities
    pub total_capacity: f64,
    /// Minimum vertex degree
    pub min_degree: usize,
    /// Maximum vertex degree
    pub max_degree: usize,
}

/// Ordered sequence of distinct terminal vertices
///
/// Position `i` in the sequence is bit `i` of every subset mask.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalSet {
    members: Vec<usize>,
    #[serde(skip)]
    positions: HashMap<usize, usize>,
}

impl TerminalSet {
    fn new(members: Vec<usize>, num_vertices: usize) -> Result<Self> {
        if members.len() < 2 {
            return Err(SparsifyError::MalformedGraph(format!(
                "terminal set has {} member(s), at least 2 required",
                members.len()
            )));
        }
        if members.len() > 63 {
            return Err(SparsifyError::MalformedGraph(format!(
                "terminal set has {} members, subset masks support at most 63",
                members.len()
            )));
        }
        let mut positions = HashMap::with_capacity(members.len());
        for (pos, &v) in members.iter().enumerate() {
            if v >= num_vertices {
                return Err(SparsifyError::MalformedGraph(format!(
                    "terminal index {v} out of range for {num_vertices} vertices"
                )));
            }
            if positions.insert(v, pos).is_some() {
                return Err(SparsifyError::MalformedGraph(format!(
                    "duplicate terminal at position {pos}"
                )));
            }
        }
        Ok(Self { members, positions })
    }

    /// Number of terminals (k)
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the set is empty (never true for a validated graph)
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Vertex index of the terminal at `pos`
    pub fn get(&self, pos: usize) -> Option<usize> {
        self.members.get(pos).copied()
    }

    /// Terminal position of vertex `v`, if it is a terminal
    pub fn position(&self, v: usize) -> Option<usize> {
        self.positions.get(&v).copied()
    }

    /// Whether vertex `v` is a terminal
    pub fn contains(&self, v: usize) -> bool {
        self.positions.contains_key(&v)
    }

    /// Terminal vertex indices in order
    pub fn as_slice(&self) -> &[usize] {
        &self.members
    }

    /// Iterate over terminal vertex indices in order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied()
    }

    /// Mask with every terminal bit set
    pub fn full_mask(&self) -> u64 {
        (1u64 << self.members.len()) - 1
    }

    /// Split the terminals into (in mask, not in mask) vertex lists
    pub fn split(&self, mask: u64) -> (Vec<usize>, Vec<usize>) {
        let mut inside = Vec::new();
        let mut outside = Vec::new();
        for (pos, &v) in self.members.iter().enumerate() {
            if mask & (1u64 << pos) != 0 {
                inside.push(v);
            } else {
                outside.push(v);
            }
        }
        (inside, outside)
    }
}

/// Immutable weighted graph snapshot with a distinguished terminal set
#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    /// External id of each arena vertex
    ids: Vec<VertexId>,
    /// External id -> arena index
    #[serde(skip)]
    index: HashMap<VertexId, usize>,
    /// Edge list in insertion order
    edges: Vec<Edge>,
    /// (min, max) index pair -> edge position
    #[serde(skip)]
    edge_index: HashMap<(usize, usize), usize>,
    /// vertex -> (neighbor, edge position)
    #[serde(skip)]
    adjacency: Vec<Vec<(usize, usize)>>,
    /// Ordered terminals
    terminals: TerminalSet,
    /// Sum of all capacities
    total_capacity: f64,
    /// Snapshot version, bumped by every update
    version: u64,
}

fn canonical_key(u: usize, v: usize) -> (usize, usize) {
    if u <= v {
        (u, v)
    } else {
        (v, u)
    }
}

fn check_capacity(capacity: Weight, u: VertexId, v: VertexId) -> Result<()> {
    if !(capacity.is_finite() && capacity > 0.0) {
        return Err(SparsifyError::MalformedGraph(format!(
            "edge ({u}, {v}) has non-positive or non-finite capacity {capacity}"
        )));
    }
    Ok(())
}

impl Graph {
    /// Build a snapshot from arena-indexed parts, merging parallel edges
    pub(crate) fn from_indexed(
        ids: Vec<VertexId>,
        edge_list: impl IntoIterator<Item = (usize, usize, Weight)>,
        terminals: Vec<usize>,
        version: u64,
    ) -> Result<Self> {
        let n = ids.len();
        if n > u32::MAX as usize {
            return Err(SparsifyError::MalformedGraph(format!(
                "{n} vertices exceed the supported maximum of {}",
                u32::MAX
            )));
        }

        let mut index = HashMap::with_capacity(n);
        for (i, &id) in ids.iter().enumerate() {
            if index.insert(id, i).is_some() {
                return Err(SparsifyError::MalformedGraph(format!(
                    "duplicate vertex id {id}"
                )));
            }
        }

        let mut edges: Vec<Edge> = Vec::new();
        let mut edge_index = HashMap::new();
        for (u, v, capacity) in edge_list {
            if u >= n || v >= n {
                return Err(SparsifyError::MalformedGraph(format!(
                    "edge ({u}, {v}) references a vertex outside 0..{n}"
                )));
            }
            if u == v {
                return Err(SparsifyError::MalformedGraph(format!(
                    "self-loop at vertex {}",
                    ids[u]
                )));
            }
            check_capacity(capacity, ids[u], ids[v])?;

            let key = canonical_key(u, v);
            match edge_index.get(&key) {
                Some(&pos) => {
                    let edge: &mut Edge = &mut edges[pos];
                    edge.capacity += capacity;
                }
                None => {
                    edge_index.insert(key, edges.len());
                    edges.push(Edge::new(u, v, capacity));
                }
            }
        }

        let mut adjacency = vec![Vec::new(); n];
        for (pos, edge) in edges.iter().enumerate() {
            adjacency[edge.source].push((edge.target, pos));
            adjacency[edge.target].push((edge.source, pos));
        }
        let total_capacity = edges.iter().map(|e| e.capacity).sum();
        let terminals = TerminalSet::new(terminals, n)?;

        Ok(Self {
            ids,
            index,
            edges,
            edge_index,
            adjacency,
            terminals,
            total_capacity,
            version,
        })
    }

    /// Number of vertices
    pub fn num_vertices(&self) -> usize {
        self.ids.len()
    }

    /// Number of edges
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// External id of arena vertex `v`
    ///
    /// # Panics
    ///
    /// Panics if `v >= self.num_vertices()`. Use [`Graph::index_of`] to go the
    /// other way from a caller-supplied id.
    pub fn vertex_id(&self, v: usize) -> VertexId {
        self.ids[v]
    }

    /// External ids in arena order
    pub fn vertex_ids(&self) -> &[VertexId] {
        &self.ids
    }

    /// Arena index of external id `id`
    pub fn index_of(&self, id: VertexId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// All edges
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Neighbors of `v` as (neighbor, edge position)
    pub fn neighbors(&self, v: usize) -> &[(usize, usize)] {
        &self.adjacency[v]
    }

    /// Degree of `v`
    pub fn degree(&self, v: usize) -> usize {
        self.adjacency.get(v).map_or(0, Vec::len)
    }

    /// Edge between two arena indices
    pub fn edge_between(&self, u: usize, v: usize) -> Option<&Edge> {
        self.edge_index
            .get(&canonical_key(u, v))
            .map(|&pos| &self.edges[pos])
    }

    /// Capacity between two arena indices (0 when not adjacent)
    pub fn capacity_between(&self, u: usize, v: usize) -> Weight {
        self.edge_between(u, v).map_or(0.0, |e| e.capacity)
    }

    /// Ordered terminal set
    pub fn terminals(&self) -> &TerminalSet {
        &self.terminals
    }

    /// Sum of all edge capacities
    pub fn total_capacity(&self) -> f64 {
        self.total_capacity
    }

    /// Snapshot version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Capacity crossing the bipartition described by `side`
    pub fn cut_capacity(&self, side: impl Fn(usize) -> bool) -> f64 {
        self.edges
            .iter()
            .filter(|e| e.crosses(&side))
            .map(|e| e.capacity)
            .sum()
    }

    /// Get graph statistics
    pub fn stats(&self) -> GraphStats {
        let degrees = self.adjacency.iter().map(Vec::len);
        GraphStats {
            num_vertices: self.num_vertices(),
            num_edges: self.num_edges(),
            num_terminals: self.terminals.len(),
            total_capacity: self.total_capacity,
            min_degree: degrees.clone().min().unwrap_or(0),
            max_degree: degrees.max().unwrap_or(0),
        }
    }

    /// Component label of every vertex, labels numbered in order of first vertex
    pub fn component_labels(&self) -> Vec<usize> {
        let n = self.num_vertices();
        let mut label = vec![usize::MAX; n];
        let mut next = 0;
        let mut queue = VecDeque::new();

        for start in 0..n {
            if label[start] != usize::MAX {
                continue;
            }
            label[start] = next;
            queue.push_back(start);
            while let Some(v) = queue.pop_front() {
                for &(w, _) in &self.adjacency[v] {
                    if label[w] == usize::MAX {
                        label[w] = next;
                        queue.push_back(w);
                    }
                }
            }
            next += 1;
        }
        label
    }

    /// Connected components as vertex index lists
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let labels = self.component_labels();
        let count = labels.iter().copied().max().map_or(0, |m| m + 1);
        let mut components = vec![Vec::new(); count];
        for (v, &c) in labels.iter().enumerate() {
            components[c].push(v);
        }
        components
    }

    /// Check if the graph is connected
    pub fn is_connected(&self) -> bool {
        self.connected_components().len() <= 1
    }

    /// New snapshot with `capacity` added between `u` and `v` (inserting the edge if absent)
    pub fn with_capacity_added(&self, u: usize, v: usize, capacity: Weight) -> Result<Self> {
        let mut edge_list: Vec<(usize, usize, Weight)> = self
            .edges
            .iter()
            .map(|e| (e.source, e.target, e.capacity))
            .collect();
        edge_list.push((u, v, capacity));
        Self::from_indexed(
            self.ids.clone(),
            edge_list,
            self.terminals.members.clone(),
            self.version + 1,
        )
    }

    /// New snapshot with the edge between `u` and `v` removed
    pub fn without_edge(&self, u: usize, v: usize) -> Result<Self> {
        let key = canonical_key(u, v);
        let pos = self.edge_index.get(&key).copied().ok_or_else(|| {
            SparsifyError::EdgeNotFound(
                self.ids.get(u).copied().unwrap_or(u as VertexId),
                self.ids.get(v).copied().unwrap_or(v as VertexId),
            )
        })?;
        let edge_list = self
            .edges
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != pos)
            .map(|(_, e)| (e.source, e.target, e.capacity));
        Self::from_indexed(
            self.ids.clone(),
            edge_list,
            self.terminals.members.clone(),
            self.version + 1,
        )
    }
}

/// Builder that validates raw vertex, edge and terminal data into a [`Graph`]
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    vertices: Option<Vec<VertexId>>,
    edges: Vec<(VertexId, VertexId, Weight)>,
    terminals: Vec<VertexId>,
}

impl GraphBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the vertex set explicitly; edges may then only reference these ids
    pub fn with_vertices(mut self, vertices: impl IntoIterator<Item = VertexId>) -> Self {
        self.vertices = Some(vertices.into_iter().collect());
        self
    }

    /// Add edges as (u, v, capacity)
    pub fn with_edges(mut self, edges: impl IntoIterator<Item = (VertexId, VertexId, Weight)>) -> Self {
        self.edges.extend(edges);
        self
    }

    /// Add a single edge
    pub fn edge(mut self, u: VertexId, v: VertexId, capacity: Weight) -> Self {
        self.edges.push((u, v, capacity));
        self
    }

    /// Set the ordered terminal sequence
    pub fn with_terminals(mut self, terminals: impl IntoIterator<Item = VertexId>) -> Self {
        self.terminals = terminals.into_iter().collect();
        self
    }

    /// Validate and build the snapshot
    pub fn build(self) -> Result<Graph> {
        let ids = match self.vertices {
            Some(ids) => ids,
            None => {
                // Implicit vertex set: first appearance order over edges, then terminals
                let mut seen = HashSet::new();
                let mut ids = Vec::new();
                let endpoints = self.edges.iter().flat_map(|&(u, v, _)| [u, v]);
                for id in endpoints.chain(self.terminals.iter().copied()) {
                    if seen.insert(id) {
                        ids.push(id);
                    }
                }
                ids
            }
        };

        let mut index = HashMap::with_capacity(ids.len());
        for (i, &id) in ids.iter().enumerate() {
            if index.insert(id, i).is_some() {
                return Err(SparsifyError::MalformedGraph(format!(
                    "duplicate vertex id {id}"
                )));
            }
        }
        let lookup = |id: VertexId| {
            index.get(&id).copied().ok_or_else(|| {
                SparsifyError::MalformedGraph(format!("reference to unknown vertex {id}"))
            })
        };

        let mut edge_list = Vec::with_capacity(self.edges.len());
        for &(u, v, capacity) in &self.edges {
            check_capacity(capacity, u, v)?;
            edge_list.push((lookup(u)?, lookup(v)?, capacity));
        }
        let terminals = self
            .terminals
            .iter()
            .map(|&t| lookup(t))
            .collect::<Result<Vec<_>>>()?;

        Graph::from_indexed(ids, edge_list, terminals, 0)
    }
}

/// Validate raw data into a graph snapshot
pub fn load_graph(
    vertices: impl IntoIterator<Item = VertexId>,
    edges: impl IntoIterator<Item = (VertexId, VertexId, Weight)>,
    terminals: impl IntoIterator<Item = VertexId>,
) -> Result<Graph> {
    GraphBuilder::new()
        .with_vertices(vertices)
        .with_edges(edges)
        .with_terminals(terminals)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Graph {
        load_graph(
            [0, 1, 2, 3],
            [(0, 1, 2.0), (0, 2, 2.0), (1, 3, 2.0), (2, 3, 2.0), (1, 2, 1.0)],
            [0, 3],
        )
        .unwrap()
    }

    #[test]
    fn test_load_graph() {
        let g = diamond();
        assert_eq!(g.num_vertices(), 4);
        assert_eq!(g.num_edges(), 5);
        assert_eq!(g.terminals().len(), 2);
        assert_eq!(g.total_capacity(), 9.0);
        assert_eq!(g.version(), 0);
    }

    #[test]
    fn test_vertex_id_maps_arena_to_external() {
        let g = load_graph([10, 20, 30], [(10, 20, 1.0), (20, 30, 1.0)], [10, 30]).unwrap();
        for v in 0..g.num_vertices() {
            assert_eq!(g.index_of(g.vertex_id(v)), Some(v));
        }
    }

    #[test]
    #[should_panic]
    fn test_vertex_id_out_of_range_panics() {
        let g = diamond();
        g.vertex_id(g.num_vertices());
    }

    #[test]
    fn test_parallel_edges_merge() {
        let g = load_graph([1, 2, 3], [(1, 2, 1.5), (2, 1, 2.5), (2, 3, 1.0)], [1, 3]).unwrap();
        assert_eq!(g.num_edges(), 2);
        let (a, b) = (g.index_of(1).unwrap(), g.index_of(2).unwrap());
        assert_eq!(g.capacity_between(a, b), 4.0);
        assert_eq!(g.capacity_between(b, a), 4.0);
    }

    #[test]
    fn test_rejects_self_loop() {
        let result = load_graph([1, 2], [(1, 1, 1.0), (1, 2, 1.0)], [1, 2]);
        assert!(matches!(result, Err(SparsifyError::MalformedGraph(_))));
    }

    #[test]
    fn test_rejects_bad_capacity() {
        assert!(load_graph([1, 2], [(1, 2, 0.0)], [1, 2]).is_err());
        assert!(load_graph([1, 2], [(1, 2, -3.0)], [1, 2]).is_err());
        assert!(load_graph([1, 2], [(1, 2, f64::NAN)], [1, 2]).is_err());
    }

    #[test]
    fn test_rejects_unknown_vertex() {
        let result = load_graph([1, 2], [(1, 7, 1.0)], [1, 2]);
        assert!(matches!(result, Err(SparsifyError::MalformedGraph(_))));
        let result = load_graph([1, 2], [(1, 2, 1.0)], [1, 9]);
        assert!(matches!(result, Err(SparsifyError::MalformedGraph(_))));
    }

    #[test]
    fn test_rejects_bad_terminals() {
        assert!(load_graph([1, 2], [(1, 2, 1.0)], [1]).is_err());
        assert!(load_graph([1, 2, 3], [(1, 2, 1.0)], [1, 2, 1]).is_err());
    }

    #[test]
    fn test_implicit_vertices() {
        let g = GraphBuilder::new()
            .edge(10, 20, 1.0)
            .edge(20, 30, 1.0)
            .with_terminals([10, 30, 40])
            .build()
            .unwrap();
        assert_eq!(g.vertex_ids(), &[10, 20, 30, 40]);
        assert_eq!(g.degree(g.index_of(40).unwrap()), 0);
    }

    #[test]
    fn test_terminal_split() {
        let g = load_graph([0, 1, 2], [(0, 1, 1.0), (1, 2, 1.0)], [2, 0, 1]).unwrap();
        let terminals = g.terminals();
        assert_eq!(terminals.full_mask(), 0b111);
        let (inside, outside) = terminals.split(0b101);
        assert_eq!(inside, vec![2, 1]);
        assert_eq!(outside, vec![0]);
        assert_eq!(terminals.position(0), Some(1));
    }

    #[test]
    fn test_cut_capacity() {
        let g = diamond();
        let s = g.index_of(0).unwrap();
        assert_eq!(g.cut_capacity(|v| v == s), 4.0);
    }

    #[test]
    fn test_components() {
        let g = load_graph([0, 1, 2, 3, 4], [(0, 1, 1.0), (2, 3, 1.0)], [0, 2]).unwrap();
        let components = g.connected_components();
        assert_eq!(components.len(), 3);
        assert!(!g.is_connected());
        assert!(diamond().is_connected());
    }

    #[test]
    fn test_copy_on_write_updates() {
        let g = diamond();
        let (a, b) = (g.index_of(1).unwrap(), g.index_of(2).unwrap());

        let added = g.with_capacity_added(a, b, 4.0).unwrap();
        assert_eq!(added.version(), 1);
        assert_eq!(added.capacity_between(a, b), 5.0);
        assert_eq!(g.capacity_between(a, b), 1.0);

        let removed = added.without_edge(a, b).unwrap();
        assert_eq!(removed.version(), 2);
        assert_eq!(removed.num_edges(), 4);
        assert!(removed.edge_between(a, b).is_none());

        let missing = removed.without_edge(a, b);
        assert!(matches!(missing, Err(SparsifyError::EdgeNotFound(1, 2))));
    }

    #[test]
    fn test_stats() {
        let stats = diamond().stats();
        assert_eq!(stats.num_vertices, 4);
        assert_eq!(stats.num_edges, 5);
        assert_eq!(stats.num_terminals, 2);
        assert_eq!(stats.min_degree, 2);
        assert_eq!(stats.max_degree, 3);
    }
}

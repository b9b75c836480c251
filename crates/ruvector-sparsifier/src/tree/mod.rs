//! Cut-equivalent trees (Gomory-Hu, Gusfield's construction)
//!
//! Builds a tree over an arbitrary subset of graph vertices such that the
//! minimum cut between any two of them equals the smallest edge weight on
//! their tree path. Each step runs one max-flow between a node and its current
//! parent, re-points the nodes on its side of the cut that shared that parent,
//! and swaps places with the parent when the grandparent also fell on its side.
//! The swap keeps the tree a cut tree: removing an edge splits the nodes along
//! a minimum cut between its endpoints. `m` nodes cost `m - 1` max-flows.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::error::{Result, SparsifyError};
use crate::flow::MinCutEngine;
use crate::graph::Graph;

/// Depth of every node below root 0
fn depths(parent: &[usize]) -> Vec<usize> {
    let m = parent.len();
    let mut depth = vec![0usize; m];
    let mut children = vec![Vec::new(); m];
    for i in 1..m {
        children[parent[i]].push(i);
    }
    let mut stack = if m > 0 { vec![0] } else { Vec::new() };
    while let Some(u) = stack.pop() {
        for &c in &children[u] {
            depth[c] = depth[u] + 1;
            stack.push(c);
        }
    }
    depth
}

/// A cut-equivalent tree over a vertex subset
#[derive(Debug, Clone, PartialEq)]
pub struct CutTree {
    /// Graph vertex of each tree node
    nodes: Vec<usize>,
    /// Parent of each node (root points at itself)
    parent: Vec<usize>,
    /// Weight of the edge to the parent
    weight: Vec<f64>,
    /// Distance from the root in tree edges
    depth: Vec<usize>,
}

impl CutTree {
    /// Build the tree over `nodes` (graph arena indices, distinct)
    #[instrument(skip(engine, graph, nodes), fields(num_nodes = nodes.len()))]
    pub fn build(engine: &MinCutEngine, graph: &Graph, nodes: &[usize]) -> Result<Self> {
        let m = nodes.len();
        let mut seen = HashSet::with_capacity(m);
        if let Some(&dup) = nodes.iter().find(|&&v| !seen.insert(v)) {
            return Err(SparsifyError::InvalidTerminalSet(format!(
                "vertex {} appears twice in the tree node set",
                graph.vertex_id(dup)
            )));
        }

        let mut parent = vec![0usize; m];
        let mut weight = vec![0.0f64; m];

        for s in 1..m {
            let t = parent[s];
            let witness = engine.min_cut_between(graph, nodes[s], nodes[t])?;
            let value = witness.value();
            if !(value.is_finite() && value >= 0.0) {
                return Err(SparsifyError::inconsistent(value, "cut-equivalent tree"));
            }
            weight[s] = value;

            for i in 0..m {
                if i != s && parent[i] == t && witness.contains(nodes[i]) {
                    parent[i] = s;
                }
            }
            // the root never lies on the source side, so node 0 stays the root
            if witness.contains(nodes[parent[t]]) {
                parent[s] = parent[t];
                parent[t] = s;
                weight[s] = weight[t];
                weight[t] = value;
            }
        }
        let depth = depths(&parent);

        debug!(
            nodes = m,
            total_weight = weight.iter().sum::<f64>(),
            "cut-equivalent tree built"
        );

        Ok(Self {
            nodes: nodes.to_vec(),
            parent,
            weight,
            depth,
        })
    }

    /// Number of tree nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Graph vertex of every node
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    /// Tree edges as (node, parent node, weight)
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (1..self.len()).map(move |i| (i, self.parent[i], self.weight[i]))
    }

    /// Minimum cut between nodes `a` and `b` (infinite when `a == b`)
    pub fn min_cut(&self, mut a: usize, mut b: usize) -> f64 {
        let mut best = f64::INFINITY;
        while a != b {
            if self.depth[a] >= self.depth[b] {
                best = best.min(self.weight[a]);
                a = self.parent[a];
            } else {
                best = best.min(self.weight[b]);
                b = self.parent[b];
            }
        }
        best
    }

    /// Minimum cut between node `from` and every node
    pub fn bottlenecks_from(&self, from: usize) -> Vec<f64> {
        let m = self.len();
        let mut children = vec![Vec::new(); m];
        for i in 1..m {
            children[self.parent[i]].push(i);
        }

        let mut best = vec![f64::NAN; m];
        best[from] = f64::INFINITY;
        let mut stack = vec![from];
        while let Some(u) = stack.pop() {
            let mut visit = |v: usize, w: f64, stack: &mut Vec<usize>| {
                if best[v].is_nan() {
                    best[v] = best[u].min(w);
                    stack.push(v);
                }
            };
            if u != 0 {
                visit(self.parent[u], self.weight[u], &mut stack);
            }
            for &c in &children[u] {
                visit(c, self.weight[c], &mut stack);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::load_graph;

    fn sample_graph() -> Graph {
        load_graph(
            [0, 1, 2, 3, 4, 5],
            [
                (0, 1, 10.0),
                (0, 2, 8.0),
                (1, 2, 2.0),
                (1, 3, 4.0),
                (2, 4, 9.0),
                (3, 4, 6.0),
                (3, 5, 10.0),
                (4, 5, 10.0),
            ],
            [0, 5],
        )
        .unwrap()
    }

    #[test]
    fn test_path_tree() {
        let g = load_graph([0, 1, 2], [(0, 1, 3.0), (1, 2, 5.0)], [0, 2]).unwrap();
        let tree = CutTree::build(&MinCutEngine::default(), &g, &[0, 1, 2]).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.edges().count(), 2);
        assert!((tree.min_cut(0, 2) - 3.0).abs() < 1e-9);
        assert!((tree.min_cut(1, 2) - 5.0).abs() < 1e-9);
        assert_eq!(tree.min_cut(1, 1), f64::INFINITY);
    }

    #[test]
    fn test_all_pairs_match_max_flow() {
        let g = sample_graph();
        let engine = MinCutEngine::default();
        let nodes: Vec<usize> = (0..g.num_vertices()).collect();
        let tree = CutTree::build(&engine, &g, &nodes).unwrap();

        for a in 0..nodes.len() {
            let row = tree.bottlenecks_from(a);
            for b in 0..nodes.len() {
                if a == b {
                    continue;
                }
                let exact = engine.min_cut_between(&g, nodes[a], nodes[b]).unwrap().value();
                assert!((tree.min_cut(a, b) - exact).abs() < 1e-9, "pair ({a}, {b})");
                assert!((row[b] - exact).abs() < 1e-9, "row ({a}, {b})");
            }
        }
    }

    #[test]
    fn test_tree_edges_are_minimum_cuts() {
        let g = sample_graph();
        let nodes: Vec<usize> = (0..g.num_vertices()).collect();
        let tree = CutTree::build(&MinCutEngine::default(), &g, &nodes).unwrap();

        for (removed, _, w) in tree.edges() {
            // nodes still reachable from `removed` once its parent edge is dropped
            let mut side = vec![false; tree.len()];
            side[removed] = true;
            let mut changed = true;
            while changed {
                changed = false;
                for (a, b, _) in tree.edges().filter(|&(a, _, _)| a != removed) {
                    if side[a] != side[b] {
                        side[a] = true;
                        side[b] = true;
                        changed = true;
                    }
                }
            }
            let crossing: f64 = g
                .edges()
                .iter()
                .filter(|e| side[e.source] != side[e.target])
                .map(|e| e.capacity)
                .sum();
            assert!((crossing - w).abs() < 1e-9, "edge above node {removed}");
        }
    }

    #[test]
    fn test_subset_tree() {
        let g = sample_graph();
        let engine = MinCutEngine::default();
        let subset = [5, 0, 3];
        let tree = CutTree::build(&engine, &g, &subset).unwrap();
        for a in 0..3 {
            for b in (a + 1)..3 {
                let exact = engine.min_cut_between(&g, subset[a], subset[b]).unwrap().value();
                assert!((tree.min_cut(a, b) - exact).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_disconnected_nodes_get_zero_edges() {
        let g = load_graph([0, 1, 2, 3], [(0, 1, 2.0), (2, 3, 2.0)], [0, 2]).unwrap();
        let tree = CutTree::build(&MinCutEngine::default(), &g, &[0, 1, 2, 3]).unwrap();
        assert_eq!(tree.min_cut(0, 2), 0.0);
        assert!((tree.min_cut(0, 1) - 2.0).abs() < 1e-9);
        assert!((tree.min_cut(2, 3) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_duplicate_nodes() {
        let g = sample_graph();
        let result = CutTree::build(&MinCutEngine::default(), &g, &[0, 1, 0]);
        assert!(matches!(result, Err(SparsifyError::InvalidTerminalSet(_))));
    }
}

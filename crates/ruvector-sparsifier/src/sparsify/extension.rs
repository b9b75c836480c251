//! Connected 0-extension cut sparsifier
//!
//! Every vertex is retracted onto a terminal and each cluster is contracted:
//!
//! 1. Cut distance: `d(v, t) = 1 / λ(v, t)`, with λ read off a cut-equivalent
//!    tree over all vertices
//! 2. Rounding: each vertex goes to the terminal with the largest λ, ties
//!    (within tolerance) to the lowest terminal position
//! 3. Repair: a cluster keeps only the part connected to its terminal; stray
//!    vertices join the adjacent anchored cluster with the heaviest connection
//! 4. Terminals still split across quotient components are joined by synthetic
//!    edges carrying the bridging min-cut value
//!
//! Every quotient cut is the capacity of some cut of the original graph, so the
//! sparsifier never under-estimates. Each terminal pair is then checked against
//! [`CutSparsifierBuilder::distortion_bound`]. If one exceeds it, the rounding is
//! dropped in favour of clustering along the cut tree: tree edges are merged
//! heaviest first, never joining two terminals. Each terminal pair's lightest
//! tree edge then separates whole clusters along a minimum cut, so every pair
//! cut is exact.

use std::time::Instant;

use tracing::{debug, instrument, warn};

use crate::config::SparsifierConfig;
use crate::error::{Result, SparsifyError};
use crate::evaluate::relative_distortion;
use crate::flow::MinCutEngine;
use crate::graph::Graph;
use crate::tree::CutTree;

use super::{
    terminal_ids, EdgeAccumulator, ResultAssembly, SparsifierBuilder, SparsifierKind,
    SparsifierResult, SyntheticEdge, UnionFind,
};

/// Builds connected 0-extension cut sparsifiers
#[derive(Debug, Clone)]
pub struct CutSparsifierBuilder {
    config: SparsifierConfig,
    engine: MinCutEngine,
}

impl CutSparsifierBuilder {
    /// Create a builder
    pub fn new(config: SparsifierConfig) -> Self {
        let engine = MinCutEngine::from_config(&config);
        Self { config, engine }
    }

    /// Builder configuration
    pub fn config(&self) -> &SparsifierConfig {
        &self.config
    }

    /// Documented distortion bound for `k` terminals: `max(1, log2 k)`
    pub fn distortion_bound(k: usize) -> f64 {
        (k as f64).log2().max(1.0)
    }

    /// The rounded retraction f: vertex -> terminal position, after connectivity repair
    pub fn retraction(&self, graph: &Graph) -> Result<Vec<usize>> {
        let tree = self.cut_tree(graph)?;
        self.repaired(graph, &tree)
    }

    /// The retraction that clusters vertices along the cut tree
    pub fn tree_retraction(&self, graph: &Graph) -> Result<Vec<usize>> {
        let tree = self.cut_tree(graph)?;
        Ok(tree_clusters(&tree, graph.terminals().len()))
    }

    /// Cut tree over every vertex; terminals come first, so node p < k is terminal position p
    fn cut_tree(&self, graph: &Graph) -> Result<CutTree> {
        let terminals = graph.terminals();
        let mut nodes: Vec<usize> = terminals.iter().collect();
        nodes.extend((0..graph.num_vertices()).filter(|&v| !terminals.contains(v)));
        CutTree::build(&self.engine, graph, &nodes)
    }

    fn repaired(&self, graph: &Graph, tree: &CutTree) -> Result<Vec<usize>> {
        let mut assign = self.round(graph, tree)?;
        let moved = repair_clusters(graph, &mut assign);
        if moved > 0 {
            debug!(moved, "stray vertices re-attached to anchored clusters");
        }
        Ok(assign)
    }

    /// Nearest terminal under the cut distance
    fn round(&self, graph: &Graph, tree: &CutTree) -> Result<Vec<usize>> {
        let terminals = graph.terminals();
        let k = terminals.len();
        let n = graph.num_vertices();

        let mut node_of = vec![0usize; n];
        for (p, &v) in tree.nodes().iter().enumerate() {
            node_of[v] = p;
        }
        let rows: Vec<Vec<f64>> = (0..k).map(|t| tree.bottlenecks_from(t)).collect();

        let mut assign = vec![0usize; n];
        for v in 0..n {
            if let Some(pos) = terminals.position(v) {
                assign[v] = pos;
                continue;
            }
            let p = node_of[v];
            let mut best = 0;
            let mut best_lambda = rows[0][p];
            for (t, row) in rows.iter().enumerate().skip(1) {
                let lambda = row[p];
                if lambda.is_nan() || lambda < 0.0 {
                    return Err(SparsifyError::inconsistent(lambda, "0-extension cut distance"));
                }
                if lambda > best_lambda + self.engine.tolerance(best_lambda) {
                    best = t;
                    best_lambda = lambda;
                }
            }
            assign[v] = best;
        }
        Ok(assign)
    }

    /// Largest relative distortion over terminal pairs, against the tree's cut values
    fn worst_pair_distortion(&self, result: &SparsifierResult, tree: &CutTree) -> Result<f64> {
        let k = result.terminal_image().len();
        let mut worst = 0.0f64;
        for a in 0..k {
            for b in (a + 1)..k {
                let original = tree.min_cut(a, b);
                let sparse = result.pair_cut(&self.engine, a, b)?.value();
                let distortion =
                    relative_distortion(original, sparse, self.engine.tolerance(original));
                worst = worst.max(distortion);
            }
        }
        Ok(worst)
    }

    /// Contract every cluster of `assign` into its terminal and reconnect the quotient
    fn contract(
        &self,
        graph: &Graph,
        assign: Vec<usize>,
        started: Instant,
    ) -> Result<SparsifierResult> {
        let terminals = graph.terminals();
        let k = terminals.len();
        let mut acc = EdgeAccumulator::default();
        for edge in graph.edges() {
            acc.add(assign[edge.source], assign[edge.target], edge.capacity);
        }
        let mut edges = acc.into_edges(0.0);

        // terminal components of the quotient
        let mut components = UnionFind::new(k);
        for &(a, b, _) in &edges {
            components.union(a, b);
        }
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut group_of = vec![usize::MAX; k];
        for t in 0..k {
            let root = components.find(t);
            if group_of[root] == usize::MAX {
                group_of[root] = groups.len();
                groups.push(Vec::new());
            }
            groups[group_of[root]].push(t);
        }

        let mut synthetic_edges = Vec::new();
        if groups.len() > 1 {
            let to_vertices = |group: &[usize]| -> Vec<usize> {
                group.iter().filter_map(|&t| terminals.get(t)).collect()
            };
            let mut joined = to_vertices(&groups[0]);
            for group in &groups[1..] {
                let other = to_vertices(group);
                let capacity = self.engine.min_cut(graph, &joined, &other)?.value();
                let inserted = capacity > self.engine.tolerance(graph.total_capacity());
                let (a, b) = (groups[0][0], group[0]);
                if inserted {
                    edges.push((a, b, capacity));
                }
                synthetic_edges.push(SyntheticEdge {
                    a,
                    b,
                    capacity,
                    inserted,
                });
                joined.extend(other);
            }
        }

        debug!(
            quotient_edges = edges.len(),
            synthetic = synthetic_edges.len(),
            "0-extension contracted"
        );

        ResultAssembly {
            kind: SparsifierKind::Cut,
            original: graph,
            started,
            ids: terminal_ids(graph),
            edges,
            vertex_map: Some(assign),
            synthetic_edges,
        }
        .finish()
    }
}

/// Merge tree edges heaviest first (ties by node), skipping merges of two terminal clusters
fn tree_clusters(tree: &CutTree, k: usize) -> Vec<usize> {
    let mut order: Vec<(usize, usize, f64)> = tree.edges().collect();
    order.sort_by(|x, y| y.2.total_cmp(&x.2).then(x.0.cmp(&y.0)));

    // union keeps the smaller root, so a cluster holding a terminal is rooted at it
    let mut clusters = UnionFind::new(tree.len());
    for (a, b, _) in order {
        let (ra, rb) = (clusters.find(a), clusters.find(b));
        if ra < k && rb < k {
            continue;
        }
        clusters.union(ra, rb);
    }

    let mut assign = vec![0usize; tree.len()];
    for (p, &v) in tree.nodes().iter().enumerate() {
        assign[v] = clusters.find(p);
    }
    assign
}

/// Re-attach vertices cut off from their cluster's terminal; returns how many moved
fn repair_clusters(graph: &Graph, assign: &mut [usize]) -> usize {
    let n = graph.num_vertices();
    let mut anchored = vec![false; n];
    let mut stack: Vec<usize> = graph.terminals().iter().collect();
    for &t in &stack {
        anchored[t] = true;
    }
    while let Some(v) = stack.pop() {
        for &(w, _) in graph.neighbors(v) {
            if !anchored[w] && assign[w] == assign[v] {
                anchored[w] = true;
                stack.push(w);
            }
        }
    }

    let mut moved = 0;
    let mut changed = true;
    while changed {
        changed = false;
        for v in 0..n {
            if anchored[v] {
                continue;
            }
            let mut weights: Vec<(usize, f64)> = Vec::new();
            for &(w, e) in graph.neighbors(v) {
                if !anchored[w] {
                    continue;
                }
                let capacity = graph.edges()[e].capacity;
                match weights.iter_mut().find(|(c, _)| *c == assign[w]) {
                    Some((_, total)) => *total += capacity,
                    None => weights.push((assign[w], capacity)),
                }
            }
            // heaviest connection, ties to the lowest terminal position
            let best = weights
                .into_iter()
                .fold(None, |best: Option<(usize, f64)>, (c, w)| match best {
                    Some((bc, bw)) if bw > w || (bw == w && bc < c) => Some((bc, bw)),
                    _ => Some((c, w)),
                });
            if let Some((cluster, _)) = best {
                if assign[v] != cluster {
                    moved += 1;
                }
                assign[v] = cluster;
                anchored[v] = true;
                changed = true;
            }
        }
    }
    moved
}

impl SparsifierBuilder for CutSparsifierBuilder {
    fn kind(&self) -> SparsifierKind {
        SparsifierKind::Cut
    }

    #[instrument(skip(self, graph), fields(n = graph.num_vertices(), k = graph.terminals().len()))]
    fn build(&self, graph: &Graph) -> Result<SparsifierResult> {
        let started = Instant::now();
        let k = graph.terminals().len();
        if k < 2 {
            return Err(SparsifyError::InvalidTerminalSet(format!(
                "0-extension needs at least 2 terminals, got {k}"
            )));
        }

        let tree = self.cut_tree(graph)?;
        let rounded = self.contract(graph, self.repaired(graph, &tree)?, started)?;
        let bound = Self::distortion_bound(k);
        let worst = self.worst_pair_distortion(&rounded, &tree)?;
        if worst <= bound {
            return Ok(rounded);
        }

        warn!(
            worst,
            bound,
            "rounded retraction exceeds the distortion bound, clustering along the cut tree"
        );
        self.contract(graph, tree_clusters(&tree, k), started)
    }
}

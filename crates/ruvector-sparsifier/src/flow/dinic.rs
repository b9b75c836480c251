//! Dinic's max-flow solver over real-valued capacities

use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct FlowEdge {
    to: usize,
    rev: usize,
    cap: f64,
}

/// Dinic's max-flow solver for set-to-set min cuts.
///
/// Residual capacities at or below `tolerance` are treated as saturated.
pub(crate) struct DinicSolver {
    adj: Vec<Vec<FlowEdge>>,
    level: Vec<i32>,
    iter: Vec<usize>,
    tolerance: f64,
}

impl DinicSolver {
    pub(crate) fn new(n: usize, tolerance: f64) -> Self {
        Self {
            adj: vec![Vec::new(); n],
            level: vec![-1; n],
            iter: vec![0; n],
            tolerance,
        }
    }

    /// Undirected edge: both arcs carry `cap`
    pub(crate) fn add_undirected(&mut self, u: usize, v: usize, cap: f64) {
        let (ru, rv) = (self.adj[v].len(), self.adj[u].len());
        self.adj[u].push(FlowEdge { to: v, rev: ru, cap });
        self.adj[v].push(FlowEdge { to: u, rev: rv, cap });
    }

    /// Directed arc with a zero-capacity reverse
    pub(crate) fn add_arc(&mut self, from: usize, to: usize, cap: f64) {
        let (rf, rt) = (self.adj[to].len(), self.adj[from].len());
        self.adj[from].push(FlowEdge { to, rev: rf, cap });
        self.adj[to].push(FlowEdge { to: from, rev: rt, cap: 0.0 });
    }

    fn bfs(&mut self, s: usize) {
        self.level.fill(-1);
        self.level[s] = 0;
        let mut q = VecDeque::new();
        q.push_back(s);
        while let Some(v) = q.pop_front() {
            for e in &self.adj[v] {
                if e.cap > self.tolerance && self.level[e.to] < 0 {
                    self.level[e.to] = self.level[v] + 1;
                    q.push_back(e.to);
                }
            }
        }
    }

    /// Push blocking flow along level-graph paths, iteratively
    fn blocking_flow(&mut self, s: usize, t: usize) -> f64 {
        let mut total = 0.0;
        let mut path: Vec<(usize, usize)> = Vec::new();
        let mut v = s;

        loop {
            if v == t {
                let pushed = path
                    .iter()
                    .map(|&(u, i)| self.adj[u][i].cap)
                    .fold(f64::INFINITY, f64::min);
                for &(u, i) in &path {
                    self.adj[u][i].cap -= pushed;
                    let (to, rev) = (self.adj[u][i].to, self.adj[u][i].rev);
                    self.adj[to][rev].cap += pushed;
                }
                total += pushed;
                path.clear();
                v = s;
                continue;
            }

            let mut advanced = false;
            while self.iter[v] < self.adj[v].len() {
                let e = &self.adj[v][self.iter[v]];
                if e.cap > self.tolerance && self.level[e.to] == self.level[v] + 1 {
                    path.push((v, self.iter[v]));
                    v = e.to;
                    advanced = true;
                    break;
                }
                self.iter[v] += 1;
            }

            if !advanced {
                // dead end: retreat and skip the arc that led here
                match path.pop() {
                    Some((u, _)) => {
                        self.iter[u] += 1;
                        v = u;
                    }
                    None => return total,
                }
            }
        }
    }

    /// Maximum s-t flow value
    pub(crate) fn max_flow(&mut self, s: usize, t: usize) -> f64 {
        let mut flow = 0.0;
        loop {
            self.bfs(s);
            if self.level[t] < 0 {
                break;
            }
            self.iter.fill(0);
            flow += self.blocking_flow(s, t);
        }
        flow
    }

    /// Vertices reachable from `s` in the residual graph (call after `max_flow`)
    pub(crate) fn source_side(&mut self, s: usize) -> Vec<bool> {
        self.bfs(s);
        self.level.iter().map(|&l| l >= 0).collect()
    }
}

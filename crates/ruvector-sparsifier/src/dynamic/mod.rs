//! Dynamic edge updates with copy-on-write snapshots
//!
//! Every update produces a new [`Graph`] with `version + 1` and rebuilds each
//! enabled sparsifier against it. Readers hold an `Arc` to the snapshot they
//! started with, which stays valid after later updates swap in a new one.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::compare::{build_all, evaluate_all, ComparisonReport};
use crate::config::SparsifierConfig;
use crate::error::{Result, SparsifyError};
use crate::graph::{Graph, VertexId, Weight};
use crate::sparsify::{SparsifierKind, SparsifierResult};

/// Type of graph update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateType {
    /// Add capacity between two vertices (creating the edge if needed)
    Insert,
    /// Remove the edge between two vertices
    Delete,
}

/// A single edge update on external vertex ids
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeUpdate {
    /// One endpoint
    pub u: VertexId,
    /// Other endpoint
    pub v: VertexId,
    /// Insert or delete
    pub update: UpdateType,
    /// Capacity to add (required for inserts)
    pub capacity: Option<Weight>,
}

impl EdgeUpdate {
    /// Insert `capacity` between `u` and `v`
    pub fn insert(u: VertexId, v: VertexId, capacity: Weight) -> Self {
        Self {
            u,
            v,
            update: UpdateType::Insert,
            capacity: Some(capacity),
        }
    }

    /// Delete the edge between `u` and `v`
    pub fn delete(u: VertexId, v: VertexId) -> Self {
        Self {
            u,
            v,
            update: UpdateType::Delete,
            capacity: None,
        }
    }
}

/// Apply one update, returning the next snapshot
pub fn apply_update(graph: &Graph, update: &EdgeUpdate) -> Result<Graph> {
    let EdgeUpdate { u, v, .. } = *update;
    match update.update {
        UpdateType::Insert => {
            let capacity = update.capacity.ok_or_else(|| {
                SparsifyError::InvalidParameter(format!("insert ({u}, {v}) without a capacity"))
            })?;
            let lookup = |id: VertexId| {
                graph.index_of(id).ok_or_else(|| {
                    SparsifyError::MalformedGraph(format!("reference to unknown vertex {id}"))
                })
            };
            graph.with_capacity_added(lookup(u)?, lookup(v)?, capacity)
        }
        UpdateType::Delete => match (graph.index_of(u), graph.index_of(v)) {
            (Some(a), Some(b)) => graph.without_edge(a, b),
            _ => Err(SparsifyError::EdgeNotFound(u, v)),
        },
    }
}

/// A snapshot with the sparsifiers built from it
#[derive(Debug)]
struct State {
    graph: Arc<Graph>,
    sparsifiers: BTreeMap<SparsifierKind, Result<Arc<SparsifierResult>>>,
}

/// Keeps a set of sparsifiers current under edge updates
#[derive(Debug)]
pub struct DynamicSparsifier {
    state: RwLock<Arc<State>>,
    /// Serializes writers; readers never wait on a rebuild
    update_lock: Mutex<()>,
    kinds: BTreeSet<SparsifierKind>,
    config: SparsifierConfig,
}

impl DynamicSparsifier {
    /// Build the enabled sparsifiers for the initial snapshot
    pub fn new(
        graph: Graph,
        kinds: impl IntoIterator<Item = SparsifierKind>,
        config: SparsifierConfig,
    ) -> Result<Self> {
        config.validate()?;
        let kinds: BTreeSet<SparsifierKind> = kinds.into_iter().collect();
        if kinds.is_empty() {
            return Err(SparsifyError::InvalidParameter(
                "at least one sparsifier kind must be enabled".to_string(),
            ));
        }
        let state = Self::rebuild(Arc::new(graph), &kinds, &config);
        Ok(Self {
            state: RwLock::new(Arc::new(state)),
            update_lock: Mutex::new(()),
            kinds,
            config,
        })
    }

    fn rebuild(graph: Arc<Graph>, kinds: &BTreeSet<SparsifierKind>, config: &SparsifierConfig) -> State {
        let sparsifiers = build_all(&graph, kinds, config).into_iter().collect();
        State { graph, sparsifiers }
    }

    fn current(&self) -> Arc<State> {
        self.state.read().clone()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<Graph> {
        Arc::clone(&self.current().graph)
    }

    /// Current snapshot version
    pub fn version(&self) -> u64 {
        self.current().graph.version()
    }

    /// Enabled kinds
    pub fn kinds(&self) -> impl Iterator<Item = SparsifierKind> + '_ {
        self.kinds.iter().copied()
    }

    /// Sparsifier of `kind` for the current snapshot
    pub fn sparsifier(&self, kind: SparsifierKind) -> Result<Arc<SparsifierResult>> {
        match self.current().sparsifiers.get(&kind) {
            Some(Ok(result)) => Ok(Arc::clone(result)),
            Some(Err(err)) => Err(err.clone()),
            None => Err(SparsifyError::InvalidParameter(format!(
                "sparsifier kind {kind} is not enabled"
            ))),
        }
    }

    /// Apply an update and rebuild every enabled sparsifier
    ///
    /// A rejected update leaves the current snapshot in place.
    #[instrument(skip(self), fields(u = update.u, v = update.v, op = ?update.update))]
    pub fn apply(&self, update: &EdgeUpdate) -> Result<Arc<Graph>> {
        let _writer = self.update_lock.lock();
        let current = self.current();
        let next = Arc::new(apply_update(&current.graph, update)?);
        let state = Self::rebuild(Arc::clone(&next), &self.kinds, &self.config);
        *self.state.write() = Arc::new(state);
        debug!(
            version = next.version(),
            edges = next.num_edges(),
            "snapshot replaced"
        );
        Ok(next)
    }

    /// Score the current sparsifiers against the current snapshot
    pub fn compare(&self) -> ComparisonReport {
        let current = self.current();
        let built: Vec<_> = current
            .sparsifiers
            .iter()
            .map(|(&kind, result)| (kind, result.clone()))
            .collect();
        evaluate_all(&current.graph, &built, &self.config)
    }

    /// Compare the initial snapshot, then every snapshot after each update
    pub fn run(&self, updates: &[EdgeUpdate]) -> Result<Vec<ComparisonReport>> {
        let mut reports = Vec::with_capacity(updates.len() + 1);
        reports.push(self.compare());
        for update in updates {
            self.apply(update)?;
            reports.push(self.compare());
        }
        info!(snapshots = reports.len(), "dynamic comparison finished");
        Ok(reports)
    }
}

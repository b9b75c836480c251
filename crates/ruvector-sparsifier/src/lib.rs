//! # RuVector Sparsifier
//!
//! Terminal sparsification: compress a capacitated graph onto a distinguished
//! set of terminals while preserving their cut and flow structure.
//!
//! ## Features
//!
//! - **Connected 0-extension**: retracts every vertex onto a terminal; cuts never
//!   under-estimate and the quotient stays connected
//! - **Flow sparsifier**: cut-equivalent tree on the terminals, exact for every
//!   terminal pair, or an average of sampled spanning trees
//! - **Mimicking network**: reproduces every terminal subset cut exactly
//! - **Comparison harness**: distortion, compression and best trade-off per
//!   strategy, on a fixed graph or under edge insertions and deletions
//!
//! ## Quick Start
//!
//! ```rust
//! use ruvector_sparsifier::prelude::*;
//!
//! // s=0, a=1, b=2, t=3
//! let graph = load_graph(
//!     [0, 1, 2, 3],
//!     [(0, 1, 2.0), (0, 2, 2.0), (1, 3, 2.0), (2, 3, 2.0), (1, 2, 1.0)],
//!     [0, 3],
//! )
//! .unwrap();
//!
//! let report = compare(&graph, &SparsifierKind::ALL, &SparsifierConfig::default()).unwrap();
//! let mimic = report.report(SparsifierKind::Mimic).unwrap();
//! assert_eq!(mimic.edge_count, 1);
//! assert!(mimic.max_distortion < 1e-9);
//! ```
//!
//! ## Dynamic Updates
//!
//! ```rust
//! use ruvector_sparsifier::prelude::*;
//!
//! let graph = load_graph(
//!     [1, 2, 3, 4, 5],
//!     [(1, 2, 3.0), (2, 3, 3.0), (3, 4, 3.0), (4, 5, 3.0), (1, 4, 1.0)],
//!     [1, 5],
//! )
//! .unwrap();
//!
//! let dynamic = DynamicSparsifier::new(graph, SparsifierKind::ALL, SparsifierConfig::default()).unwrap();
//! let reports = dynamic
//!     .run(&[EdgeUpdate::insert(4, 5, 5.0), EdgeUpdate::delete(3, 4)])
//!     .unwrap();
//! assert_eq!(reports.len(), 3);
//! ```
//!
//! ## Architecture
//!
//! - [`graph`]: immutable snapshots with an ordered terminal set
//! - [`flow`]: max-flow / min-cut engine and cut witnesses
//! - [`tree`]: cut-equivalent trees (Gusfield)
//! - [`sparsify`]: the three builders and their shared result type
//! - [`evaluate`]: distortion reports
//! - [`compare`]: per-snapshot comparison of strategies
//! - [`dynamic`]: copy-on-write updates that rebuild every enabled sparsifier
//!
//! ## Feature Flags
//!
//! - `parallel` - run independent cut queries and builders on the rayon pool (enabled by default)

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_range_loop)]

pub mod compare;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod evaluate;
pub mod flow;
pub mod graph;
pub mod sparsify;
pub mod subset;
pub mod tree;

pub use compare::{compare, ComparisonReport, Outcome};
pub use config::{FlowMethod, SparsifierConfig, MAX_ENUMERATION_TERMINALS};
pub use dynamic::{apply_update, DynamicSparsifier, EdgeUpdate, UpdateType};
pub use error::{Result, SparsifyError};
pub use evaluate::{relative_distortion, DistortionReport, Evaluator, PairwiseReport};
pub use flow::{CutFunction, CutWitness, MinCutEngine};
pub use graph::{load_graph, Edge, Graph, GraphBuilder, GraphStats, TerminalSet, VertexId, Weight};
pub use sparsify::{
    build_sparsifier, CutSparsifierBuilder, FlowSparsifierBuilder, MimickingNetworkBuilder,
    SparsifierBuilder, SparsifierKind, SparsifierMetadata, SparsifierResult, SyntheticEdge,
};
pub use subset::{SubsetMask, SubsetSelection};
pub use tree::CutTree;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Prelude module for convenient imports
///
/// ```rust
/// use ruvector_sparsifier::prelude::*;
///
/// let graph = GraphBuilder::new()
///     .edge(1, 2, 1.0)
///     .with_terminals([1, 2])
///     .build()
///     .unwrap();
/// let flow = build_sparsifier(SparsifierKind::Flow, &graph, &SparsifierConfig::default()).unwrap();
/// assert_eq!(flow.num_vertices(), 2);
/// ```
pub mod prelude {
    //! Prelude module with commonly used types

    pub use crate::{
        apply_update, build_sparsifier, compare, load_graph, ComparisonReport, CutWitness,
        DistortionReport, DynamicSparsifier, EdgeUpdate, Evaluator, FlowMethod, Graph,
        GraphBuilder, MinCutEngine, Outcome, Result, SparsifierConfig, SparsifierKind,
        SparsifierResult, SparsifyError, SubsetSelection, UpdateType, VertexId, Weight,
    };
}

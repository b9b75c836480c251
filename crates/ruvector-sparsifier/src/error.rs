//! Error types for terminal sparsification

use thiserror::Error;

use crate::graph::VertexId;

/// Result type for sparsifier operations
pub type Result<T> = std::result::Result<T, SparsifyError>;

/// Errors that can occur while loading graphs, computing cuts or building sparsifiers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SparsifyError {
    /// Input graph violates a structural invariant
    #[error("Malformed graph: {0}")]
    MalformedGraph(String),

    /// Terminal set is too small or references unknown vertices
    #[error("Invalid terminal set: {0}")]
    InvalidTerminalSet(String),

    /// No finite cut separates the source set from the sink set
    #[error("No finite cut separates the terminals (vacuous cut capacity {capacity})")]
    DisconnectedTerminals {
        /// Total capacity across the vacuous cut
        capacity: f64,
    },

    /// A computed cut value is negative or NaN
    #[error("Inconsistent cut value {value} during {context}")]
    InconsistentCut {
        /// The offending value
        value: f64,
        /// Where the value was produced
        context: String,
    },

    /// Mimicking network enumeration bound exceeded
    #[error("Terminal count {terminals} exceeds enumeration limit {limit}")]
    TerminalCountExceeded {
        /// Number of terminals in the graph
        terminals: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Edge not found in the current snapshot
    #[error("Edge not found: ({0}, {1})")]
    EdgeNotFound(VertexId, VertexId),

    /// Invalid configuration parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Report serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SparsifyError {
    fn from(err: serde_json::Error) -> Self {
        SparsifyError::Serialization(err.to_string())
    }
}

impl SparsifyError {
    /// Check if the caller can recover by changing what it asks for
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SparsifyError::TerminalCountExceeded { .. }
                | SparsifyError::EdgeNotFound(_, _)
                | SparsifyError::DisconnectedTerminals { .. }
        )
    }

    /// Check if the error was caused by bad caller input
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            SparsifyError::MalformedGraph(_)
                | SparsifyError::InvalidTerminalSet(_)
                | SparsifyError::EdgeNotFound(_, _)
                | SparsifyError::InvalidParameter(_)
        )
    }

    /// Check if a comparison run should report this builder as skipped rather than failed
    pub fn is_skippable(&self) -> bool {
        matches!(self, SparsifyError::TerminalCountExceeded { .. })
    }

    pub(crate) fn inconsistent(value: f64, context: impl Into<String>) -> Self {
        SparsifyError::InconsistentCut {
            value,
            context: context.into(),
        }
    }
}

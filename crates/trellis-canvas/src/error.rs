//! Error types for the canvas engine.

use thiserror::Error;

use trellis_types::{BlockId, BlockKind, EdgeId, StatusTransitionError};

/// Errors reported by a [`BoardStore`](crate::store::BoardStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Entity does not exist in the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Store refused the write (validation, permissions, quota, ...).
    #[error("rejected: {0}")]
    Rejected(String),

    /// Store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors from graph controller operations.
///
/// Only [`CanvasError::Persistence`] is meant for display to the user. Every
/// other variant describes a request the engine refused before touching the
/// store, and the live graph is unchanged when one is returned.
///
/// Rejected connections and unplaceable drops are not errors at all: they
/// come back as [`ConnectOutcome::Rejected`](crate::ConnectOutcome::Rejected)
/// and `Ok(None)` respectively.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// The store rejected a write. The affected entities were rolled back.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("block not found: {0}")]
    BlockNotFound(BlockId),

    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("invalid parsing status change: {0}")]
    InvalidStatus(#[from] StatusTransitionError),

    /// Operation requires a block of a different kind.
    #[error("block {block} is {actual}, expected {expected}")]
    KindMismatch {
        block: BlockId,
        expected: BlockKind,
        actual: BlockKind,
    },
}

impl CanvasError {
    /// Whether the presentation layer should show this error to the user.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, CanvasError::Persistence(_))
    }
}

/// Result type for canvas operations.
pub type Result<T> = std::result::Result<T, CanvasError>;

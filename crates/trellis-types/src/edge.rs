//! Directed connections between blocks.
//!
//! An edge `source → target` means "source flows into target". Self-loops
//! are never valid, and at most one edge may exist per ordered pair: a second
//! `connect(a, b)` is rejected, while `connect(b, a)` is a different edge.

use serde::{Deserialize, Serialize};

use crate::ids::{BlockId, BoardId, EdgeId};

/// A directed connection, owned by exactly one board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub board_id: BoardId,
    pub source: BlockId,
    pub target: BlockId,
    /// Unix millis.
    pub created_at: u64,
}

impl Edge {
    /// Whether this edge touches `block` at either end.
    pub fn touches(&self, block: BlockId) -> bool {
        self.source == block || self.target == block
    }

    /// Same ordered `(source, target)` pair.
    pub fn connects(&self, source: BlockId, target: BlockId) -> bool {
        self.source == source && self.target == target
    }
}

/// Rejected connection request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidEdge {
    #[error("block {0} cannot connect to itself")]
    SelfLoop(BlockId),
    #[error("edge {from} -> {to} already exists")]
    Duplicate { from: BlockId, to: BlockId },
    #[error("block {0} is not on this board")]
    UnknownBlock(BlockId),
}

/// Validate and build a new edge against the candidate edge set.
///
/// Pure: assigns a fresh id and timestamp, never talks to persistence.
pub fn create_edge<'a>(
    board_id: BoardId,
    source: BlockId,
    target: BlockId,
    existing: impl IntoIterator<Item = &'a Edge>,
) -> Result<Edge, InvalidEdge> {
    if source == target {
        return Err(InvalidEdge::SelfLoop(source));
    }
    if existing.into_iter().any(|e| e.connects(source, target)) {
        return Err(InvalidEdge::Duplicate { from: source, to: target });
    }
    Ok(Edge {
        id: EdgeId::new(),
        board_id,
        source,
        target,
        created_at: crate::now_millis(),
    })
}

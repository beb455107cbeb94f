//! Block and edge types for the trellis canvas graph.
//!
//! This crate is the data foundation: typed IDs, blocks, edges, snapshots,
//! and canvas geometry. It has **no internal trellis dependencies** and never
//! talks to persistence. The engine crate builds on it.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Board (BoardId) ← one canvas project
//!     └── owns Block (BlockId)  : typed node with position + content
//!     └── owns Edge (EdgeId)    : directed source → target, "flows into"
//!
//! GraphSnapshot ← (blocks, edges) of one board at one instant
//! ```
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`Block`]         | Canvas node (kind, position, content, ...)   |
//! | [`BlockKind`]     | Closed set of node types                     |
//! | [`Edge`]          | Directed connection between two blocks       |
//! | [`GraphSnapshot`] | Unit of undo/redo and refetch                |
//! | [`CanvasPoint`]   | Position in pan/zoom-independent space       |
//! |-------------------|----------------------------------------------|

pub mod block;
pub mod edge;
pub mod geometry;
pub mod ids;
pub mod snapshot;

pub use block::{
    Block, BlockKind, BlockOverrides, BlockPatch, GROUP_MEMBERS_KEY, LINKED_ITEMS_KEY, Metadata,
    ParsingStatus, StatusTransitionError, create_block,
};
pub use edge::{Edge, InvalidEdge, create_edge};
pub use geometry::{CanvasPoint, ScreenPoint, Size};
pub use ids::{BlockId, BoardId, EdgeId};
pub use snapshot::{GraphSnapshot, PositionUpdate};

/// Current time as Unix milliseconds. Used by constructors throughout the crate.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

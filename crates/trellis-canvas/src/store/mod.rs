//! Persistence collaborator.
//!
//! The graph controller never owns the durable copy of a board. It talks to
//! a [`BoardStore`], which is id-based and knows nothing about history,
//! placement, or context. Every call is a potential suspension point and may
//! fail; the controller rolls back its optimistic local change when it does.

mod memory;

pub use memory::{MemoryStore, StoreOp};

use async_trait::async_trait;

use trellis_types::{Block, BlockId, BlockPatch, BoardId, Edge, EdgeId, PositionUpdate};

use crate::error::StoreResult;

/// Remote store for blocks and edges.
#[async_trait]
pub trait BoardStore: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// All blocks of a board, in insertion order.
    async fn list_blocks(&self, board: BoardId) -> StoreResult<Vec<Block>>;

    /// All edges of a board, in creation order.
    async fn list_edges(&self, board: BoardId) -> StoreResult<Vec<Edge>>;

    // ========================================================================
    // Blocks
    // ========================================================================

    /// Persist a new block and return the stored copy.
    ///
    /// The store may assign its own id and timestamp; callers must adopt the
    /// returned block.
    async fn create_block(&self, board: BoardId, block: &Block) -> StoreResult<Block>;

    async fn update_block(&self, id: BlockId, patch: &BlockPatch) -> StoreResult<()>;

    /// Delete a block. The store drops edges touching it.
    async fn delete_block(&self, id: BlockId) -> StoreResult<()>;

    /// Apply a batch of position changes in one call.
    async fn update_positions(&self, batch: &[PositionUpdate]) -> StoreResult<()>;

    // ========================================================================
    // Edges
    // ========================================================================

    async fn create_edge(&self, board: BoardId, source: BlockId, target: BlockId) -> StoreResult<Edge>;

    async fn delete_edge(&self, id: EdgeId) -> StoreResult<()>;
}

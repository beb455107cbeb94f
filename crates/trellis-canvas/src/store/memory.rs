//! In-memory board store.
//!
//! Used for tests and offline boards. All data is ephemeral. Individual
//! operations can be made to fail on demand, and every call is counted, so
//! tests can assert both rollback behavior and how many persistence calls an
//! interaction produced.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

use trellis_types::{
    Block, BlockId, BlockPatch, BoardId, Edge, EdgeId, PositionUpdate, create_edge,
};

use super::BoardStore;
use crate::error::{StoreError, StoreResult};

/// Store operations, for failure injection and call counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StoreOp {
    ListBlocks,
    ListEdges,
    CreateBlock,
    UpdateBlock,
    DeleteBlock,
    UpdatePositions,
    CreateEdge,
    DeleteEdge,
}

#[derive(Debug, Default)]
struct Tables {
    blocks: IndexMap<BlockId, (BoardId, Block)>,
    edges: IndexMap<EdgeId, Edge>,
}

/// In-memory [`BoardStore`].
///
/// Thread-safe via internal `RwLock`. Like a database, the store assigns ids
/// to created blocks and edges; seeded entities keep their own.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failures: RwLock<HashMap<StoreOp, StoreError>>,
    calls: RwLock<HashMap<StoreOp, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `op` fail with `error` until cleared.
    pub fn fail_on(&self, op: StoreOp, error: StoreError) {
        self.failures.write().insert(op, error);
    }

    pub fn clear_failure(&self, op: StoreOp) {
        self.failures.write().remove(&op);
    }

    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    /// Number of times `op` was called, failed calls included.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls.read().get(&op).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        self.calls.write().clear();
    }

    /// Direct read, bypassing counters and failure injection.
    pub fn block(&self, id: BlockId) -> Option<Block> {
        self.tables.read().blocks.get(&id).map(|(_, b)| b.clone())
    }

    pub fn block_count(&self) -> usize {
        self.tables.read().blocks.len()
    }

    pub fn edge_count(&self) -> usize {
        self.tables.read().edges.len()
    }

    /// Seed a block directly, bypassing counters and failure injection.
    pub fn insert_block(&self, board: BoardId, block: Block) {
        self.tables.write().blocks.insert(block.id, (board, block));
    }

    /// Seed an edge directly.
    pub fn insert_edge(&self, edge: Edge) {
        self.tables.write().edges.insert(edge.id, edge);
    }

    /// Count the call, then fail if `op` is armed.
    fn enter(&self, op: StoreOp) -> StoreResult<()> {
        *self.calls.write().entry(op).or_insert(0) += 1;
        match self.failures.read().get(&op) {
            Some(err) => {
                tracing::debug!(%op, error = %err, "injected store failure");
                Err(err.clone())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BoardStore for MemoryStore {
    async fn list_blocks(&self, board: BoardId) -> StoreResult<Vec<Block>> {
        self.enter(StoreOp::ListBlocks)?;
        let tables = self.tables.read();
        Ok(tables
            .blocks
            .values()
            .filter(|(b, _)| *b == board)
            .map(|(_, block)| block.clone())
            .collect())
    }

    async fn list_edges(&self, board: BoardId) -> StoreResult<Vec<Edge>> {
        self.enter(StoreOp::ListEdges)?;
        let tables = self.tables.read();
        Ok(tables
            .edges
            .values()
            .filter(|e| e.board_id == board)
            .cloned()
            .collect())
    }

    async fn create_block(&self, board: BoardId, block: &Block) -> StoreResult<Block> {
        self.enter(StoreOp::CreateBlock)?;
        let mut stored = block.clone();
        stored.id = BlockId::new();
        self.tables
            .write()
            .blocks
            .insert(stored.id, (board, stored.clone()));
        Ok(stored)
    }

    async fn update_block(&self, id: BlockId, patch: &BlockPatch) -> StoreResult<()> {
        self.enter(StoreOp::UpdateBlock)?;
        let mut tables = self.tables.write();
        let (_, block) = tables
            .blocks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("block {id}")))?;
        patch.apply(block);
        Ok(())
    }

    async fn delete_block(&self, id: BlockId) -> StoreResult<()> {
        self.enter(StoreOp::DeleteBlock)?;
        let mut tables = self.tables.write();
        if tables.blocks.shift_remove(&id).is_none() {
            return Err(StoreError::not_found(format!("block {id}")));
        }
        tables.edges.retain(|_, e| !e.touches(id));
        Ok(())
    }

    async fn update_positions(&self, batch: &[PositionUpdate]) -> StoreResult<()> {
        self.enter(StoreOp::UpdatePositions)?;
        let mut tables = self.tables.write();
        // All or nothing.
        if let Some(missing) = batch.iter().find(|u| !tables.blocks.contains_key(&u.id)) {
            return Err(StoreError::not_found(format!("block {}", missing.id)));
        }
        for update in batch {
            if let Some((_, block)) = tables.blocks.get_mut(&update.id) {
                block.position = update.point();
            }
        }
        Ok(())
    }

    async fn create_edge(&self, board: BoardId, source: BlockId, target: BlockId) -> StoreResult<Edge> {
        self.enter(StoreOp::CreateEdge)?;
        let mut tables = self.tables.write();
        for id in [source, target] {
            if !tables.blocks.contains_key(&id) {
                return Err(StoreError::not_found(format!("block {id}")));
            }
        }
        let edge = create_edge(board, source, target, tables.edges.values())
            .map_err(|e| StoreError::rejected(e.to_string()))?;
        tables.edges.insert(edge.id, edge.clone());
        Ok(edge)
    }

    async fn delete_edge(&self, id: EdgeId) -> StoreResult<()> {
        self.enter(StoreOp::DeleteEdge)?;
        let mut tables = self.tables.write();
        tables
            .edges
            .shift_remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(format!("edge {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_types::{BlockKind, BlockOverrides, CanvasPoint, create_block};

    fn text_block() -> Block {
        create_block(BlockKind::Text, CanvasPoint::default(), BlockOverrides::new())
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let store = MemoryStore::new();
        let (board, other) = (BoardId::new(), BoardId::new());
        let a = store.create_block(board, &text_block()).await.unwrap();
        store.create_block(other, &text_block()).await.unwrap();

        let listed = store.list_blocks(board).await.unwrap();
        assert_eq!(listed, vec![a]);
        assert_eq!(listed[0].title, "Text Block");
        assert_eq!(store.calls(StoreOp::CreateBlock), 2);
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_id() {
        let store = MemoryStore::new();
        let local = text_block();
        let stored = store.create_block(BoardId::new(), &local).await.unwrap();
        assert_ne!(stored.id, local.id);
        assert_eq!(stored.kind, local.kind);
        assert!(store.block(local.id).is_none());
        assert!(store.block(stored.id).is_some());
    }

    #[tokio::test]
    async fn test_delete_block_cascades_edges() {
        let store = MemoryStore::new();
        let board = BoardId::new();
        let a = store.create_block(board, &text_block()).await.unwrap();
        let b = store.create_block(board, &text_block()).await.unwrap();
        store.create_edge(board, a.id, b.id).await.unwrap();
        store.create_edge(board, b.id, a.id).await.unwrap();
        assert_eq!(store.edge_count(), 2);

        store.delete_block(a.id).await.unwrap();
        assert_eq!(store.edge_count(), 0);
        assert!(matches!(
            store.delete_block(a.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_edge_validates() {
        let store = MemoryStore::new();
        let board = BoardId::new();
        let a = store.create_block(board, &text_block()).await.unwrap();
        let b = store.create_block(board, &text_block()).await.unwrap();

        store.create_edge(board, a.id, b.id).await.unwrap();
        assert!(matches!(
            store.create_edge(board, a.id, b.id).await,
            Err(StoreError::Rejected(_))
        ));
        assert!(matches!(
            store.create_edge(board, a.id, BlockId::new()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_positions_all_or_nothing() {
        let store = MemoryStore::new();
        let board = BoardId::new();
        let a = store.create_block(board, &text_block()).await.unwrap();

        let batch = [
            PositionUpdate::new(a.id, CanvasPoint::new(9.0, 9.0)),
            PositionUpdate::new(BlockId::new(), CanvasPoint::new(1.0, 1.0)),
        ];
        assert!(store.update_positions(&batch).await.is_err());
        assert_eq!(store.block(a.id).unwrap().position, CanvasPoint::default());

        store.update_positions(&batch[..1]).await.unwrap();
        assert_eq!(store.block(a.id).unwrap().position, CanvasPoint::new(9.0, 9.0));
    }

    #[tokio::test]
    async fn test_update_block_applies_patch() {
        let store = MemoryStore::new();
        let board = BoardId::new();
        let a = store.create_block(board, &text_block()).await.unwrap();
        store
            .update_block(a.id, &BlockPatch::new().content("edited"))
            .await
            .unwrap();
        assert_eq!(store.block(a.id).unwrap().content, "edited");
    }

    #[tokio::test]
    async fn test_failure_injection_counts_calls() {
        let store = MemoryStore::new();
        let board = BoardId::new();
        store.fail_on(StoreOp::CreateBlock, StoreError::unavailable("offline"));

        let err = store.create_block(board, &text_block()).await.unwrap_err();
        assert_eq!(err, StoreError::unavailable("offline"));
        assert_eq!(store.block_count(), 0);
        assert_eq!(store.calls(StoreOp::CreateBlock), 1);

        store.clear_failure(StoreOp::CreateBlock);
        store.create_block(board, &text_block()).await.unwrap();
        assert_eq!(store.block_count(), 1);
        assert_eq!(store.calls(StoreOp::CreateBlock), 2);
    }

    #[test]
    fn test_store_op_names() {
        assert_eq!(StoreOp::UpdatePositions.to_string(), "update_positions");
        assert_eq!("delete_edge".parse::<StoreOp>().unwrap(), StoreOp::DeleteEdge);
    }
}

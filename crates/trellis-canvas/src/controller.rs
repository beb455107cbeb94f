//! Graph controller: the single owner of one open board.
//!
//! Every mutation goes through here and follows the same shape:
//!
//! 1. validate locally (pure, no store call on rejection)
//! 2. apply optimistically to the live graph
//! 3. await the one persistence call
//! 4. on success: adopt the store's copy, checkpoint history (structural
//!    changes only), publish a [`CanvasFlow`]
//! 5. on failure: roll back exactly the entities touched in step 2 and
//!    return [`CanvasError::Persistence`]
//!
//! History reflects local mutation order. Undo and redo replace the live
//! graph wholesale and never call the store. The controller keeps a mirror
//! of what the store holds; the next mutation after an undo or redo first
//! [`reconcile`]s the store against the live graph. Entities the store
//! re-creates get new ids, which are rewritten in the graph and in history,
//! and stale ids passed back in are resolved through an alias table.
//! [`refetch`] replaces both the graph and the mirror with the store's copy.
//!
//! Dragging is split in two: [`move_position`] for every frame (local only)
//! and [`commit_positions`] at drag end (one batched store call, at most one
//! history entry).
//!
//! [`reconcile`]: GraphController::reconcile
//! [`refetch`]: GraphController::refetch
//! [`move_position`]: GraphController::move_position
//! [`commit_positions`]: GraphController::commit_positions

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use trellis_types::{
    Block, BlockId, BlockKind, BlockOverrides, BlockPatch, BoardId, CanvasPoint, Edge, EdgeId,
    GraphSnapshot, InvalidEdge, ParsingStatus, PositionUpdate, ScreenPoint, create_edge,
};

use crate::config::CanvasConfig;
use crate::context::{AggregatedContext, ContextAggregator};
use crate::error::{CanvasError, Result, StoreError, StoreResult};
use crate::flows::{CanvasFlow, FlowBus, ReplaceReason, Subscription};
use crate::graph::BoardGraph;
use crate::history::HistoryManager;
use crate::placement::{DropPayload, PlacementResolver, Viewport};
use crate::store::BoardStore;

/// Result of a connection request.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectOutcome {
    Connected(Edge),
    /// Refused before any store call; the edge set is unchanged.
    Rejected(InvalidEdge),
}

impl ConnectOutcome {
    pub fn edge(&self) -> Option<&Edge> {
        match self {
            Self::Connected(edge) => Some(edge),
            Self::Rejected(_) => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

pub struct GraphController {
    board: BoardId,
    store: Arc<dyn BoardStore>,
    graph: BoardGraph,
    /// What the store is known to hold.
    persisted: BoardGraph,
    /// Set by undo/redo until the store has been reconciled.
    diverged: bool,
    block_aliases: HashMap<BlockId, BlockId>,
    edge_aliases: HashMap<EdgeId, EdgeId>,
    history: HistoryManager,
    placement: PlacementResolver,
    aggregator: ContextAggregator,
    flows: FlowBus<CanvasFlow>,
    /// Position each block had when its current drag started.
    drag_origins: HashMap<BlockId, CanvasPoint>,
    config: CanvasConfig,
}

impl std::fmt::Debug for GraphController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphController")
            .field("board", &self.board)
            .field("blocks", &self.graph.block_count())
            .field("edges", &self.graph.edges().len())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl GraphController {
    /// Controller for a board starting empty. The empty graph is the
    /// history baseline.
    pub fn new(store: Arc<dyn BoardStore>, board: BoardId, config: CanvasConfig) -> Self {
        Self::with_graph(store, board, config, BoardGraph::new())
    }

    /// Controller seeded from the store's current copy of `board`.
    #[tracing::instrument(skip(store, config), name = "canvas.load")]
    pub async fn load(store: Arc<dyn BoardStore>, board: BoardId, config: CanvasConfig) -> Result<Self> {
        let snapshot = fetch(store.as_ref(), board).await?;
        tracing::info!(
            board = %board,
            blocks = snapshot.blocks.len(),
            edges = snapshot.edges.len(),
            "board loaded"
        );
        Ok(Self::with_graph(store, board, config, BoardGraph::from_snapshot(snapshot)))
    }

    fn with_graph(store: Arc<dyn BoardStore>, board: BoardId, config: CanvasConfig, graph: BoardGraph) -> Self {
        let mut history = HistoryManager::new(config.history_depth);
        history.push_state(graph.snapshot());
        Self {
            board,
            store,
            persisted: graph.clone(),
            graph,
            diverged: false,
            block_aliases: HashMap::new(),
            edge_aliases: HashMap::new(),
            history,
            placement: PlacementResolver::from_config(&config),
            aggregator: ContextAggregator::new(config.context_separator.clone()),
            flows: FlowBus::new(config.event_capacity),
            drag_origins: HashMap::new(),
            config,
        }
    }

    /// Swap the placement resolver, e.g. for a seeded one.
    pub fn with_placement(mut self, placement: PlacementResolver) -> Self {
        self.placement = placement;
        self
    }

    // ========================================================================
    // Read side
    // ========================================================================

    pub fn board(&self) -> BoardId {
        self.board
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn graph(&self) -> &BoardGraph {
        &self.graph
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.graph.block(id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.graph.blocks()
    }

    pub fn edges(&self) -> &[Edge] {
        self.graph.edges()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    /// One-hop incoming neighbors of `target`, in edge creation order.
    pub fn connected_blocks(&self, target: BlockId) -> Vec<&Block> {
        self.graph.connected_blocks(target)
    }

    /// Aggregated context for `target`, computed fresh from the live graph.
    pub fn context_for(&self, target: BlockId) -> AggregatedContext {
        self.aggregator.aggregate_graph(target, &self.graph)
    }

    /// Structural-change stream, filtered by subject pattern (`">"` for all).
    pub fn subscribe(&self, pattern: &str) -> Subscription<CanvasFlow> {
        self.flows.subscribe(pattern)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Current id of a block whose id the store may have reassigned.
    pub fn resolve_block_id(&self, id: BlockId) -> BlockId {
        self.block_aliases.get(&id).copied().unwrap_or(id)
    }

    pub fn resolve_edge_id(&self, id: EdgeId) -> EdgeId {
        self.edge_aliases.get(&id).copied().unwrap_or(id)
    }

    /// Whether an undo or redo has left the store behind the live graph.
    pub fn is_diverged(&self) -> bool {
        self.diverged
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    /// Add a block from the toolbar; `None` places it at a random point.
    pub async fn add_block(&mut self, kind: BlockKind, position: Option<CanvasPoint>) -> Result<Block> {
        self.add_block_with(kind, position, BlockOverrides::new()).await
    }

    #[tracing::instrument(skip(self, overrides), name = "canvas.add_block")]
    pub async fn add_block_with(
        &mut self,
        kind: BlockKind,
        position: Option<CanvasPoint>,
        overrides: BlockOverrides,
    ) -> Result<Block> {
        let block = self.placement.resolve_toolbar(kind, position, overrides);
        self.admit_block(block).await
    }

    /// Create a block from something dropped at viewport pixel `point`.
    ///
    /// `Ok(None)` when the drop cannot be placed or its payload is unknown.
    #[tracing::instrument(skip(self, payload), fields(discriminator = %payload.discriminator), name = "canvas.drop_item")]
    pub async fn drop_item(
        &mut self,
        payload: &DropPayload,
        point: ScreenPoint,
        viewport: &Viewport,
    ) -> Result<Option<Block>> {
        match self.placement.resolve_drop(payload, point, viewport) {
            Ok(block) => self.admit_block(block).await.map(Some),
            Err(reason) => {
                tracing::debug!(%reason, "drop ignored");
                Ok(None)
            }
        }
    }

    async fn admit_block(&mut self, block: Block) -> Result<Block> {
        self.sync_store().await?;
        let local_id = block.id;
        self.graph.insert_block(block.clone());

        match self.store.create_block(self.board, &block).await {
            Ok(stored) => {
                self.graph.replace_block(local_id, stored.clone());
                self.persisted.insert_block(stored.clone());
                self.checkpoint();
                tracing::debug!(block = %stored.id, kind = %stored.kind, "block added");
                self.flows.publish(CanvasFlow::BlockAdded {
                    board: self.board,
                    block: stored.clone(),
                });
                Ok(stored)
            }
            Err(err) => {
                self.graph.remove_block(local_id);
                tracing::warn!(kind = %block.kind, error = %err, "create block failed, rolled back");
                Err(err.into())
            }
        }
    }

    /// Edit a block's fields. Content edits are not checkpointed.
    #[tracing::instrument(skip(self, patch), name = "canvas.update_block")]
    pub async fn update_block(&mut self, id: BlockId, patch: BlockPatch) -> Result<Block> {
        self.sync_store().await?;
        let id = self.resolve_block_id(id);
        let block = self
            .graph
            .block_mut(id)
            .ok_or(CanvasError::BlockNotFound(id))?;
        if patch.is_empty() {
            return Ok(block.clone());
        }
        if let Some(status) = patch.parsing_status {
            block.clone().set_parsing_status(status)?;
        }

        let previous = block.clone();
        patch.apply(block);
        let updated = block.clone();

        match self.store.update_block(id, &patch).await {
            Ok(()) => {
                if let Some(stored) = self.persisted.block_mut(id) {
                    patch.apply(stored);
                }
                self.flows.publish(CanvasFlow::BlockUpdated {
                    board: self.board,
                    block: updated.clone(),
                });
                Ok(updated)
            }
            Err(err) => {
                if let Some(slot) = self.graph.block_mut(id) {
                    *slot = previous;
                }
                tracing::warn!(block = %id, error = %err, "update block failed, rolled back");
                Err(err.into())
            }
        }
    }

    /// Advance a document/url block's parse pipeline.
    pub async fn set_parsing_status(&mut self, id: BlockId, status: ParsingStatus) -> Result<Block> {
        self.update_block(id, BlockPatch::new().parsing_status(status)).await
    }

    /// Replace a group's membership list.
    pub async fn set_group_members(&mut self, group: BlockId, members: &[BlockId]) -> Result<Block> {
        self.sync_store().await?;
        let group = self.resolve_block_id(group);
        let members: Vec<BlockId> = members.iter().map(|&m| self.resolve_block_id(m)).collect();
        let block = self.graph.block(group).ok_or(CanvasError::BlockNotFound(group))?;
        if block.kind != BlockKind::Group {
            return Err(CanvasError::KindMismatch {
                block: group,
                expected: BlockKind::Group,
                actual: block.kind,
            });
        }
        let mut updated = block.clone();
        updated.set_group_members(&members);
        self.update_block(group, BlockPatch::new().metadata(updated.metadata))
            .await
    }

    /// Delete a block and every edge touching it.
    #[tracing::instrument(skip(self), name = "canvas.delete_block")]
    pub async fn delete_block(&mut self, id: BlockId) -> Result<()> {
        self.sync_store().await?;
        let id = self.resolve_block_id(id);
        let removed = self
            .graph
            .remove_block_cascade(id)
            .ok_or(CanvasError::BlockNotFound(id))?;

        match self.store.delete_block(id).await {
            Ok(()) => {
                self.drag_origins.remove(&id);
                self.persisted.remove_block_cascade(id);
                self.checkpoint();
                let edge_ids = removed.edges.iter().map(|(_, e)| e.id).collect();
                tracing::debug!(block = %id, edges = removed.edges.len(), "block deleted");
                self.flows.publish(CanvasFlow::BlockRemoved {
                    board: self.board,
                    block_id: id,
                    edge_ids,
                });
                Ok(())
            }
            Err(err) => {
                self.graph.restore_removed(removed);
                tracing::warn!(block = %id, error = %err, "delete block failed, rolled back");
                Err(err.into())
            }
        }
    }

    // ========================================================================
    // Positions
    // ========================================================================

    /// Move a block for one drag frame. Local only: no store call, no
    /// history. Returns `false` for an unknown block or non-finite point.
    pub fn move_position(&mut self, id: BlockId, position: CanvasPoint) -> bool {
        if !position.is_finite() {
            return false;
        }
        let id = self.resolve_block_id(id);
        match self.graph.set_position(id, position) {
            Some(previous) => {
                self.drag_origins.entry(id).or_insert(previous);
                true
            }
            None => false,
        }
    }

    /// End a single-block drag. See [`commit_positions`](Self::commit_positions).
    pub async fn commit_position(&mut self, id: BlockId, position: CanvasPoint) -> Result<bool> {
        self.commit_positions(&[(id, position)]).await
    }

    /// End a drag of one or more blocks.
    ///
    /// Blocks whose final position equals the one last checkpointed are
    /// dropped from the batch. The rest go to the store in one call and get
    /// one history entry. Returns whether anything was persisted.
    #[tracing::instrument(skip(self, moves), fields(count = moves.len()), name = "canvas.commit_positions")]
    pub async fn commit_positions(&mut self, moves: &[(BlockId, CanvasPoint)]) -> Result<bool> {
        self.sync_store().await?;
        // Last write per block wins, first-seen order kept.
        let mut finals: IndexMap<BlockId, CanvasPoint> = IndexMap::new();
        for &(id, point) in moves {
            finals.insert(self.resolve_block_id(id), point);
        }

        let mut batch = Vec::new();
        let mut rollback = Vec::new();
        for (id, point) in finals {
            let origin = self.drag_origins.remove(&id);
            if !point.is_finite() || !self.graph.contains_block(id) {
                tracing::debug!(block = %id, "skipping position commit");
                continue;
            }
            let recorded = self
                .history
                .current()
                .and_then(|s| s.block(id))
                .map(|b| b.position)
                .or(origin);
            self.graph.set_position(id, point);
            if recorded == Some(point) {
                continue;
            }
            batch.push(PositionUpdate::new(id, point));
            if let Some(recorded) = recorded {
                rollback.push((id, recorded));
            }
        }

        if batch.is_empty() {
            tracing::debug!("no positions changed");
            return Ok(false);
        }

        match self.store.update_positions(&batch).await {
            Ok(()) => {
                for update in &batch {
                    self.persisted.set_position(update.id, update.point());
                }
                self.checkpoint();
                self.flows.publish(CanvasFlow::PositionsCommitted {
                    board: self.board,
                    moves: batch,
                });
                Ok(true)
            }
            Err(err) => {
                for (id, recorded) in rollback {
                    self.graph.set_position(id, recorded);
                }
                tracing::warn!(count = batch.len(), error = %err, "position commit failed, rolled back");
                Err(err.into())
            }
        }
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Connect `source → target`. Invalid requests never reach the store.
    #[tracing::instrument(skip(self), name = "canvas.connect")]
    pub async fn connect(&mut self, source: BlockId, target: BlockId) -> Result<ConnectOutcome> {
        self.sync_store().await?;
        let (source, target) = (self.resolve_block_id(source), self.resolve_block_id(target));
        let validated = create_edge(self.board, source, target, self.graph.edges()).and_then(|edge| {
            match [source, target].into_iter().find(|id| !self.graph.contains_block(*id)) {
                Some(missing) => Err(InvalidEdge::UnknownBlock(missing)),
                None => Ok(edge),
            }
        });
        let edge = match validated {
            Ok(edge) => edge,
            Err(invalid) => {
                tracing::debug!(%invalid, "connection rejected");
                return Ok(ConnectOutcome::Rejected(invalid));
            }
        };

        let local_id = edge.id;
        self.graph.insert_edge(edge);

        match self.store.create_edge(self.board, source, target).await {
            Ok(stored) => {
                self.graph.replace_edge(local_id, stored.clone());
                self.persisted.insert_edge(stored.clone());
                self.checkpoint();
                tracing::debug!(edge = %stored.id, "edge added");
                self.flows.publish(CanvasFlow::EdgeAdded {
                    board: self.board,
                    edge: stored.clone(),
                });
                Ok(ConnectOutcome::Connected(stored))
            }
            Err(err) => {
                self.graph.remove_edge(local_id);
                tracing::warn!(error = %err, "create edge failed, rolled back");
                Err(err.into())
            }
        }
    }

    #[tracing::instrument(skip(self), name = "canvas.delete_edge")]
    pub async fn delete_edge(&mut self, id: EdgeId) -> Result<()> {
        self.sync_store().await?;
        let id = self.resolve_edge_id(id);
        let (index, edge) = self
            .graph
            .remove_edge(id)
            .ok_or(CanvasError::EdgeNotFound(id))?;

        match self.store.delete_edge(id).await {
            Ok(()) => {
                self.persisted.remove_edge(id);
                self.checkpoint();
                self.flows.publish(CanvasFlow::EdgeRemoved {
                    board: self.board,
                    edge_id: id,
                });
                Ok(())
            }
            Err(err) => {
                self.graph.restore_edge(index, edge);
                tracing::warn!(edge = %id, error = %err, "delete edge failed, rolled back");
                Err(err.into())
            }
        }
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Step back one checkpoint. `false` when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        match self.history.undo().cloned() {
            Some(snapshot) => {
                self.apply_snapshot(snapshot, ReplaceReason::Undo);
                self.diverged = true;
                true
            }
            None => {
                tracing::debug!("nothing to undo");
                false
            }
        }
    }

    /// Step forward one checkpoint. `false` when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        match self.history.redo().cloned() {
            Some(snapshot) => {
                self.apply_snapshot(snapshot, ReplaceReason::Redo);
                self.diverged = true;
                true
            }
            None => {
                tracing::debug!("nothing to redo");
                false
            }
        }
    }

    /// Replace the live graph with the store's copy and checkpoint it.
    ///
    /// On failure the live graph is left as it was.
    #[tracing::instrument(skip(self), name = "canvas.refetch")]
    pub async fn refetch(&mut self) -> Result<()> {
        let snapshot = fetch(self.store.as_ref(), self.board).await?;
        self.persisted = BoardGraph::from_snapshot(snapshot.clone());
        self.diverged = false;
        self.apply_snapshot(snapshot, ReplaceReason::Refetch);
        self.checkpoint();
        Ok(())
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Bring the store in line with the live graph.
    ///
    /// Deletes what the graph no longer has, re-creates what the store lost,
    /// then pushes field and position differences. Blocks mid-drag keep
    /// their stored position until the drag is committed. A failure stops
    /// the pass: completed steps stay recorded and the rest is retried by
    /// the next mutation.
    #[tracing::instrument(skip(self), name = "canvas.reconcile")]
    pub async fn reconcile(&mut self) -> Result<()> {
        self.diverged = true;
        let mut renamed = false;

        let stale_blocks: Vec<BlockId> = self
            .persisted
            .blocks()
            .map(|b| b.id)
            .filter(|id| !self.graph.contains_block(*id))
            .collect();
        for id in stale_blocks {
            tolerate_missing(self.store.delete_block(id).await)?;
            self.persisted.remove_block_cascade(id);
        }

        let stale_edges: Vec<EdgeId> = self
            .persisted
            .edges()
            .iter()
            .filter(|e| self.graph.edge(e.id).is_none())
            .map(|e| e.id)
            .collect();
        for id in stale_edges {
            tolerate_missing(self.store.delete_edge(id).await)?;
            self.persisted.remove_edge(id);
        }

        let lost_blocks: Vec<Block> = self
            .graph
            .blocks()
            .filter(|b| !self.persisted.contains_block(b.id))
            .cloned()
            .collect();
        for block in lost_blocks {
            let stored = self.store.create_block(self.board, &block).await?;
            if stored.id != block.id {
                self.rename_block(block.id, stored.id);
                renamed = true;
            }
            self.persisted.insert_block(stored);
        }

        let drifted: Vec<(Block, Block)> = self
            .graph
            .blocks()
            .filter_map(|local| {
                let stored = self.persisted.block(local.id)?;
                (stored != local).then(|| (stored.clone(), local.clone()))
            })
            .collect();
        let mut moves = Vec::new();
        for (stored, local) in drifted {
            let patch = BlockPatch::between(&stored, &local);
            if !patch.is_empty() {
                self.store.update_block(local.id, &patch).await?;
                if let Some(slot) = self.persisted.block_mut(local.id) {
                    patch.apply(slot);
                }
            }
            if stored.position != local.position && !self.drag_origins.contains_key(&local.id) {
                moves.push(PositionUpdate::new(local.id, local.position));
            }
        }
        if !moves.is_empty() {
            self.store.update_positions(&moves).await?;
            for update in &moves {
                self.persisted.set_position(update.id, update.point());
            }
        }

        let lost_edges: Vec<Edge> = self
            .graph
            .edges()
            .iter()
            .filter(|e| self.persisted.edge(e.id).is_none())
            .cloned()
            .collect();
        for edge in lost_edges {
            let stored = self.store.create_edge(self.board, edge.source, edge.target).await?;
            if stored.id != edge.id {
                self.rename_edge(edge.id, stored.id);
                renamed = true;
            }
            self.persisted.insert_edge(stored);
        }

        self.diverged = false;
        tracing::debug!(renamed, "store reconciled");
        if renamed {
            self.flows.publish(CanvasFlow::GraphReplaced {
                board: self.board,
                reason: ReplaceReason::Reconcile,
            });
        }
        Ok(())
    }

    async fn sync_store(&mut self) -> Result<()> {
        if self.diverged {
            self.reconcile().await?;
        }
        Ok(())
    }

    fn rename_block(&mut self, from: BlockId, to: BlockId) {
        self.graph.rename_block(from, to);
        self.history.rewrite(|s| s.rename_block(from, to));
        if let Some(origin) = self.drag_origins.remove(&from) {
            self.drag_origins.insert(to, origin);
        }
        for alias in self.block_aliases.values_mut().filter(|alias| **alias == from) {
            *alias = to;
        }
        self.block_aliases.insert(from, to);
    }

    fn rename_edge(&mut self, from: EdgeId, to: EdgeId) {
        self.graph.rename_edge(from, to);
        self.history.rewrite(|s| s.rename_edge(from, to));
        for alias in self.edge_aliases.values_mut().filter(|alias| **alias == from) {
            *alias = to;
        }
        self.edge_aliases.insert(from, to);
    }

    fn apply_snapshot(&mut self, snapshot: GraphSnapshot, reason: ReplaceReason) {
        self.graph.replace(snapshot);
        self.drag_origins.clear();
        self.flows.publish(CanvasFlow::GraphReplaced {
            board: self.board,
            reason,
        });
    }

    fn checkpoint(&mut self) {
        self.history.push_state(self.graph.snapshot());
    }
}

/// A delete of something the store no longer has is already done.
fn tolerate_missing(result: StoreResult<()>) -> StoreResult<()> {
    match result {
        Err(StoreError::NotFound(what)) => {
            tracing::debug!(%what, "already gone from store");
            Ok(())
        }
        other => other,
    }
}

async fn fetch(store: &dyn BoardStore, board: BoardId) -> Result<GraphSnapshot> {
    let blocks = store.list_blocks(board).await?;
    let edges = store.list_edges(board).await?;
    Ok(GraphSnapshot::new(blocks, edges))
}

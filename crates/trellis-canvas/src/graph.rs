//! In-memory board graph.
//!
//! `BoardGraph` is the live copy of one board. Blocks are kept in insertion
//! order and edges in creation order; both orders are observable (rendering
//! order, context segment order) and are preserved across remove/restore so
//! a rolled-back mutation leaves the graph exactly as it was.

use indexmap::IndexMap;

use trellis_types::{Block, BlockId, CanvasPoint, Edge, EdgeId, GraphSnapshot};

/// Live blocks and edges of one board.
#[derive(Debug, Clone, Default)]
pub struct BoardGraph {
    blocks: IndexMap<BlockId, Block>,
    edges: Vec<Edge>,
}

/// Everything removed by [`BoardGraph::remove_block_cascade`], with the
/// original positions needed to put it back.
#[derive(Debug, Clone)]
pub struct RemovedBlock {
    pub index: usize,
    pub block: Block,
    /// `(index, edge)` pairs in ascending index order.
    pub edges: Vec<(usize, Edge)>,
}

impl BoardGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let blocks = snapshot.blocks.into_iter().map(|b| (b.id, b)).collect();
        Self {
            blocks,
            edges: snapshot.edges,
        }
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::new(self.blocks.values().cloned().collect(), self.edges.clone())
    }

    /// Replace everything wholesale.
    pub fn replace(&mut self, snapshot: GraphSnapshot) {
        *self = Self::from_snapshot(snapshot);
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(&id)
    }

    pub fn contains_block(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// Blocks in insertion order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Append a block. An existing block with the same id is replaced in place.
    pub fn insert_block(&mut self, block: Block) {
        self.blocks.insert(block.id, block);
    }

    /// Swap the block stored under `id` for `block`, keeping its position in
    /// insertion order. Used when the store hands back its canonical copy,
    /// possibly under a different id.
    pub fn replace_block(&mut self, id: BlockId, block: Block) -> bool {
        let Some(index) = self.blocks.get_index_of(&id) else {
            return false;
        };
        self.blocks.shift_remove(&id);
        self.blocks.shift_insert(index, block.id, block);
        true
    }

    /// Remove a single block without touching edges.
    pub fn remove_block(&mut self, id: BlockId) -> Option<(usize, Block)> {
        self.blocks.shift_remove_full(&id).map(|(index, _, block)| (index, block))
    }

    /// Remove a block and every edge touching it.
    pub fn remove_block_cascade(&mut self, id: BlockId) -> Option<RemovedBlock> {
        let (index, block) = self.remove_block(id)?;
        let mut edges = Vec::new();
        let mut kept = Vec::with_capacity(self.edges.len());
        for (i, edge) in self.edges.drain(..).enumerate() {
            if edge.touches(id) {
                edges.push((i, edge));
            } else {
                kept.push(edge);
            }
        }
        self.edges = kept;
        Some(RemovedBlock { index, block, edges })
    }

    /// Undo a [`remove_block_cascade`](Self::remove_block_cascade).
    pub fn restore_removed(&mut self, removed: RemovedBlock) {
        self.restore_block(removed.index, removed.block);
        for (index, edge) in removed.edges {
            self.restore_edge(index, edge);
        }
    }

    /// Re-insert a block at its former index (clamped to the current length).
    pub fn restore_block(&mut self, index: usize, block: Block) {
        let index = index.min(self.blocks.len());
        self.blocks.shift_insert(index, block.id, block);
    }

    /// Give a block a new id, rewriting edge endpoints and group membership.
    /// Every order is kept.
    pub fn rename_block(&mut self, from: BlockId, to: BlockId) -> bool {
        if !self.contains_block(from) {
            return false;
        }
        let mut snapshot = self.snapshot();
        snapshot.rename_block(from, to);
        self.replace(snapshot);
        true
    }

    /// Set a block's position. Returns the previous position.
    pub fn set_position(&mut self, id: BlockId, position: CanvasPoint) -> Option<CanvasPoint> {
        self.blocks
            .get_mut(&id)
            .map(|b| std::mem::replace(&mut b.position, position))
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Edges in creation order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn has_edge(&self, source: BlockId, target: BlockId) -> bool {
        self.edges.iter().any(|e| e.connects(source, target))
    }

    pub fn insert_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Swap the edge stored under `id` for `edge`, keeping its order.
    pub fn replace_edge(&mut self, id: EdgeId, edge: Edge) -> bool {
        match self.edges.iter_mut().find(|e| e.id == id) {
            Some(slot) => {
                *slot = edge;
                true
            }
            None => false,
        }
    }

    pub fn rename_edge(&mut self, from: EdgeId, to: EdgeId) -> bool {
        match self.edges.iter_mut().find(|e| e.id == from) {
            Some(edge) => {
                edge.id = to;
                true
            }
            None => false,
        }
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Option<(usize, Edge)> {
        let index = self.edges.iter().position(|e| e.id == id)?;
        Some((index, self.edges.remove(index)))
    }

    /// Re-insert an edge at its former index (clamped to the current length).
    pub fn restore_edge(&mut self, index: usize, edge: Edge) {
        let index = index.min(self.edges.len());
        self.edges.insert(index, edge);
    }

    /// Edges whose target is `target`, in creation order.
    pub fn incoming(&self, target: BlockId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.target == target)
    }

    /// One-hop incoming neighbors of `target`, in edge creation order.
    ///
    /// Edges pointing at blocks that are no longer present are skipped.
    pub fn connected_blocks(&self, target: BlockId) -> Vec<&Block> {
        self.incoming(target)
            .filter_map(|e| self.blocks.get(&e.source))
            .collect()
    }
}

//! Whole-board snapshots.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::edge::Edge;
use crate::ids::{BlockId, EdgeId};

/// The full `(blocks, edges)` state of one board at a point in time.
///
/// Blocks keep insertion order and edges keep creation order; context
/// aggregation depends on the latter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub blocks: Vec<Block>,
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn new(blocks: Vec<Block>, edges: Vec<Edge>) -> Self {
        Self { blocks, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.edges.is_empty()
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    /// Rename a block everywhere it is referenced: its own id, edge
    /// endpoints, and group membership lists.
    pub fn rename_block(&mut self, from: BlockId, to: BlockId) {
        for block in &mut self.blocks {
            if block.id == from {
                block.id = to;
            }
            let members = block.group_members();
            if members.contains(&from) {
                let renamed: Vec<BlockId> = members
                    .into_iter()
                    .map(|m| if m == from { to } else { m })
                    .collect();
                block.set_group_members(&renamed);
            }
        }
        for edge in &mut self.edges {
            if edge.source == from {
                edge.source = to;
            }
            if edge.target == from {
                edge.target = to;
            }
        }
    }

    pub fn rename_edge(&mut self, from: EdgeId, to: EdgeId) {
        for edge in self.edges.iter_mut().filter(|e| e.id == from) {
            edge.id = to;
        }
    }
}

/// One entry of a batched position commit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: BlockId,
    pub x: f64,
    pub y: f64,
}

impl PositionUpdate {
    pub fn new(id: BlockId, point: crate::CanvasPoint) -> Self {
        Self { id, x: point.x, y: point.y }
    }

    pub fn point(&self) -> crate::CanvasPoint {
        crate::CanvasPoint::new(self.x, self.y)
    }
}

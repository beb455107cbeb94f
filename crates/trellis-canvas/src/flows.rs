//! Structural-change events.
//!
//! The controller publishes a [`CanvasFlow`] after every committed mutation,
//! undo, redo, and refetch. Views and context consumers subscribe and re-pull
//! whatever they derive from the graph. Nothing is cached behind their back.
//!
//! # Subjects
//!
//! | Subject          | Published after                          |
//! |------------------|------------------------------------------|
//! | `block.added`    | add_block / drop_item                    |
//! | `block.updated`  | update_block / set_parsing_status        |
//! | `block.removed`  | delete_block (edge removals are implied) |
//! | `block.moved`    | commit_position(s)                       |
//! | `edge.added`     | connect                                  |
//! | `edge.removed`   | delete_edge                              |
//! | `graph.replaced` | undo / redo / refetch / reconcile        |
//!
//! # Pattern Matching
//!
//! Dot-separated tokens with NATS-style wildcards:
//! - `*` matches exactly one token: `block.*` matches `block.added`
//! - `>` matches one or more trailing tokens: `>` matches everything
//! - anything else must match literally

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use trellis_types::{Block, BlockId, BoardId, Edge, EdgeId, PositionUpdate};

/// Check if a subject matches a pattern.
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let mut pattern = pattern.split('.').peekable();
    let mut subject = subject.split('.');

    while let Some(token) = pattern.next() {
        match (token, subject.next()) {
            // `>` only counts at the end and needs at least one token.
            (">", Some(_)) => return pattern.peek().is_none(),
            (_, None) => return false,
            ("*", Some(_)) => {}
            (literal, Some(s)) if literal == s => {}
            _ => return false,
        }
    }
    subject.next().is_none()
}

/// Payloads that know their subject.
pub trait HasSubject {
    fn subject(&self) -> &str;
}

/// A message on the bus.
#[derive(Clone, Debug)]
pub struct FlowMessage<T> {
    pub subject: String,
    pub payload: T,
    pub timestamp: Instant,
}

impl<T: HasSubject> FlowMessage<T> {
    pub fn new(payload: T) -> Self {
        Self {
            subject: payload.subject().to_string(),
            payload,
            timestamp: Instant::now(),
        }
    }
}

// ============================================================================
// Canvas events
// ============================================================================

/// Why the whole graph was swapped out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplaceReason {
    Undo,
    Redo,
    Refetch,
    /// The store re-created entities under new ids.
    Reconcile,
}

/// Committed change to one board's graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CanvasFlow {
    BlockAdded { board: BoardId, block: Block },
    BlockUpdated { board: BoardId, block: Block },
    /// The block and every edge touching it are gone.
    BlockRemoved {
        board: BoardId,
        block_id: BlockId,
        edge_ids: Vec<EdgeId>,
    },
    PositionsCommitted { board: BoardId, moves: Vec<PositionUpdate> },
    EdgeAdded { board: BoardId, edge: Edge },
    EdgeRemoved { board: BoardId, edge_id: EdgeId },
    GraphReplaced { board: BoardId, reason: ReplaceReason },
}

impl CanvasFlow {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::BlockAdded { .. } => "block.added",
            Self::BlockUpdated { .. } => "block.updated",
            Self::BlockRemoved { .. } => "block.removed",
            Self::PositionsCommitted { .. } => "block.moved",
            Self::EdgeAdded { .. } => "edge.added",
            Self::EdgeRemoved { .. } => "edge.removed",
            Self::GraphReplaced { .. } => "graph.replaced",
        }
    }

    pub fn board(&self) -> BoardId {
        match self {
            Self::BlockAdded { board, .. }
            | Self::BlockUpdated { board, .. }
            | Self::BlockRemoved { board, .. }
            | Self::PositionsCommitted { board, .. }
            | Self::EdgeAdded { board, .. }
            | Self::EdgeRemoved { board, .. }
            | Self::GraphReplaced { board, .. } => *board,
        }
    }

    /// Whether consumers of aggregated context should recompute.
    ///
    /// Position-only commits never change context.
    pub fn affects_context(&self) -> bool {
        !matches!(self, Self::PositionsCommitted { .. })
    }
}

impl HasSubject for CanvasFlow {
    fn subject(&self) -> &str {
        CanvasFlow::subject(self)
    }
}

// ============================================================================
// FlowBus
// ============================================================================

/// Typed broadcast bus with subject filtering on the receive side.
#[derive(Debug)]
pub struct FlowBus<T: Clone + Send + 'static> {
    tx: broadcast::Sender<FlowMessage<T>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> FlowBus<T> {
    /// Create a bus buffering up to `capacity` messages per subscriber
    /// (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + HasSubject + 'static> FlowBus<T> {
    /// Publish to every subscriber. Returns how many received it; having
    /// none is fine.
    pub fn publish(&self, payload: T) -> usize {
        self.tx.send(FlowMessage::new(payload)).unwrap_or(0)
    }

    pub fn subscribe(&self, pattern: &str) -> Subscription<T> {
        Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone + Send + 'static> Clone for FlowBus<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Receiving end of a [`FlowBus`], filtered by a subject pattern.
pub struct Subscription<T: Clone> {
    pattern: String,
    rx: broadcast::Receiver<FlowMessage<T>>,
}

impl<T: Clone> Subscription<T> {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Next matching message. `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if matches_pattern(&self.pattern, &msg.subject) => return Some(msg),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(pattern = %self.pattern, lagged = n, "canvas subscription lagged");
                }
            }
        }
    }

    /// Next matching message if one is already queued.
    pub fn try_recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) if matches_pattern(&self.pattern, &msg.subject) => return Some(msg),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                    return None;
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(pattern = %self.pattern, lagged = n, "canvas subscription lagged");
                }
            }
        }
    }

    /// Drain every queued matching message.
    pub fn drain(&mut self) -> Vec<FlowMessage<T>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl<T: Clone> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

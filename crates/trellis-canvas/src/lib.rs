//! Canvas graph engine.
//!
//! Owns the live block/edge graph of one open board and keeps four views of
//! it consistent: the in-memory graph, the derived AI context of each chat
//! block, the remote copy behind a [`BoardStore`], and the undo stack.
//!
//! ```text
//! user action ─▶ GraphController ─▶ BoardGraph (optimistic)
//!                     │    ├──▶ BoardStore (await, rollback on failure)
//!                     │    ├──▶ HistoryManager (structural changes only)
//!                     │    └──▶ FlowBus<CanvasFlow> ─▶ subscribers
//!                     └──▶ ContextAggregator (pure, on demand)
//! ```
//!
//! # Modules
//!
//! |---------------|------------------------------------------------------|
//! | Module        | Purpose                                              |
//! |---------------|------------------------------------------------------|
//! | [`graph`]     | In-memory blocks and edges, order-preserving         |
//! | [`context`]   | One-hop context aggregation for a target block       |
//! | [`history`]   | Bounded undo/redo over whole-graph snapshots         |
//! | [`placement`] | Toolbar placement, screen→canvas, drop payloads      |
//! | [`store`]     | Persistence collaborator trait + in-memory backend   |
//! | [`flows`]     | Structural-change events                             |
//! | [`controller`]| The façade tying it together                         |
//! |---------------|------------------------------------------------------|

pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod flows;
pub mod graph;
pub mod history;
pub mod placement;
pub mod store;

pub use config::{CanvasConfig, ConfigError, PlacementWindow};
pub use context::{AggregatedContext, ContextAggregator, IMAGE_PLACEHOLDER, aggregate};
pub use controller::{ConnectOutcome, GraphController};
pub use error::{CanvasError, Result, StoreError, StoreResult};
pub use flows::{CanvasFlow, FlowBus, FlowMessage, ReplaceReason, Subscription, matches_pattern};
pub use graph::BoardGraph;
pub use history::HistoryManager;
pub use placement::{DropPayload, PlacementError, PlacementResolver, Viewport, screen_to_canvas};
pub use store::{BoardStore, MemoryStore, StoreOp};

pub use trellis_types as types;

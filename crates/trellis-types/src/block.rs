//! Block types: the nodes of a canvas board.
//!
//! ## Design: one struct, closed kind set
//!
//! A block is a single struct tagged by [`BlockKind`]. Fields that only some
//! kinds use (`url`, `file_url`, `parsing_status`) are `Option`s, and anything
//! more specialised lives in the open `metadata` bag. Per-kind behavior
//! (default title, default size, context label) is a `match` on the kind, so
//! adding a kind means adding one arm in each table and nothing else.
//!
//! Well-known metadata keys:
//!
//! - `members` on `group` blocks: array of block id strings
//! - `linked_items` on `brain` blocks: array of source item ids

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::geometry::{CanvasPoint, Size};
use crate::ids::BlockId;

/// Open key/value bag for kind-specific extras.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key holding a group's member block ids.
pub const GROUP_MEMBERS_KEY: &str = "members";

/// Metadata key holding a brain block's linked source item ids.
pub const LINKED_ITEMS_KEY: &str = "linked_items";

/// What a block *is*. Immutable after creation.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum BlockKind {
    /// Free-form note.
    #[default]
    #[strum(serialize = "text", serialize = "note")]
    Text,
    Image,
    /// Web link; `content` holds the scraped page text.
    #[strum(serialize = "url", serialize = "link")]
    Url,
    /// Uploaded document; `content` holds the extracted text.
    Document,
    Video,
    /// Visual group whose members flow into context as one unit.
    Group,
    /// AI chat panel, the usual aggregation target.
    Chat,
    /// Knowledge aggregator over linked items.
    #[strum(serialize = "brain", serialize = "knowledge")]
    Brain,
    /// Creative canvas; `content` holds serialized JSON.
    Creative,
}

impl BlockKind {
    /// Every kind, in declaration order.
    pub const ALL: [BlockKind; 9] = [
        BlockKind::Text,
        BlockKind::Image,
        BlockKind::Url,
        BlockKind::Document,
        BlockKind::Video,
        BlockKind::Group,
        BlockKind::Chat,
        BlockKind::Brain,
        BlockKind::Creative,
    ];

    /// Parse from string (case-insensitive).
    ///
    /// Supports aliases: "note" -> Text, "link" -> Url, "knowledge" -> Brain.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Text => "text",
            BlockKind::Image => "image",
            BlockKind::Url => "url",
            BlockKind::Document => "document",
            BlockKind::Video => "video",
            BlockKind::Group => "group",
            BlockKind::Chat => "chat",
            BlockKind::Brain => "brain",
            BlockKind::Creative => "creative",
        }
    }

    /// Upper-case label used in aggregated context headers (`[TEXT: ...]`).
    pub fn context_label(&self) -> &'static str {
        match self {
            BlockKind::Text => "TEXT",
            BlockKind::Image => "IMAGE",
            BlockKind::Url => "URL",
            BlockKind::Document => "DOCUMENT",
            BlockKind::Video => "VIDEO",
            BlockKind::Group => "GROUP",
            BlockKind::Chat => "CHAT",
            BlockKind::Brain => "BRAIN",
            BlockKind::Creative => "CREATIVE",
        }
    }

    /// Title a freshly created block gets when none is supplied.
    pub fn default_title(&self) -> &'static str {
        match self {
            BlockKind::Text => "Text Block",
            BlockKind::Image => "Image",
            BlockKind::Url => "Link",
            BlockKind::Document => "Document",
            BlockKind::Video => "Video",
            BlockKind::Group => "Group",
            BlockKind::Chat => "AI Chat",
            BlockKind::Brain => "Knowledge",
            BlockKind::Creative => "Creative",
        }
    }

    pub fn default_size(&self) -> Size {
        match self {
            BlockKind::Text => Size::new(300.0, 200.0),
            BlockKind::Image => Size::new(300.0, 300.0),
            BlockKind::Url => Size::new(320.0, 240.0),
            BlockKind::Document => Size::new(320.0, 400.0),
            BlockKind::Video => Size::new(480.0, 320.0),
            BlockKind::Group => Size::new(600.0, 400.0),
            BlockKind::Chat => Size::new(400.0, 500.0),
            BlockKind::Brain => Size::new(360.0, 320.0),
            BlockKind::Creative => Size::new(400.0, 400.0),
        }
    }

    /// Whether blocks of this kind go through a parse/scrape pipeline.
    pub fn has_parsing_status(&self) -> bool {
        matches!(self, BlockKind::Document | BlockKind::Url)
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parse/scrape pipeline state for `document` and `url` blocks.
///
/// `none → pending → processing → {completed | failed}`. A failed block may
/// be retried by moving it back to `pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ParsingStatus {
    /// Nothing requested yet.
    #[default]
    #[serde(rename = "none")]
    #[strum(serialize = "none")]
    NotStarted,
    Pending,
    Processing,
    #[strum(serialize = "completed", serialize = "done")]
    Completed,
    #[strum(serialize = "failed", serialize = "error")]
    Failed,
}

impl ParsingStatus {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParsingStatus::NotStarted => "none",
            ParsingStatus::Pending => "pending",
            ParsingStatus::Processing => "processing",
            ParsingStatus::Completed => "completed",
            ParsingStatus::Failed => "failed",
        }
    }

    /// Check whether moving from `self` to `next` follows the pipeline.
    ///
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(&self, next: ParsingStatus) -> bool {
        use ParsingStatus::*;
        *self == next
            || matches!(
                (self, next),
                (NotStarted, Pending)
                    | (Pending, Processing)
                    | (Pending, Failed)
                    | (Processing, Completed)
                    | (Processing, Failed)
                    | (Failed, Pending)
            )
    }
}

impl std::fmt::Display for ParsingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected parsing-status change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusTransitionError {
    #[error("{0} blocks have no parsing status")]
    Unsupported(BlockKind),
    #[error("parsing status cannot move from {from} to {to}")]
    Invalid {
        from: ParsingStatus,
        to: ParsingStatus,
    },
}

/// A node on the canvas.
///
/// ## Field groups
///
/// - **Core**: id, kind, position, size, title, content, created_at
/// - **Resource** (image/video/document/url/creative): url, file_url
/// - **Pipeline** (document/url): parsing_status
/// - **Context**: instruction_prompt, read only by the context aggregator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    pub position: CanvasPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    pub title: String,
    /// Text payload; meaning depends on `kind`.
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    /// Natural-language hint for how connected chats should use this block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_prompt: Option<String>,
    /// Present only on kinds with a parse pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsing_status: Option<ParsingStatus>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    /// Unix millis.
    pub created_at: u64,
}

impl Block {
    /// Resource reference for the block, preferring the uploaded file.
    pub fn resource_url(&self) -> Option<&str> {
        self.file_url
            .as_deref()
            .or(self.url.as_deref())
            .filter(|u| !u.is_empty())
    }

    /// Instruction prompt, ignoring blank values.
    pub fn instruction(&self) -> Option<&str> {
        self.instruction_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Member ids of a group block.
    ///
    /// Entries that are not valid ids are skipped. Non-group blocks have no
    /// members.
    pub fn group_members(&self) -> Vec<BlockId> {
        if self.kind != BlockKind::Group {
            return Vec::new();
        }
        self.metadata
            .get(GROUP_MEMBERS_KEY)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| BlockId::parse(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace the membership list (metadata only, no kind check).
    pub fn set_group_members(&mut self, members: &[BlockId]) {
        let list = members
            .iter()
            .map(|id| serde_json::Value::String(id.to_string()))
            .collect();
        self.metadata
            .insert(GROUP_MEMBERS_KEY.to_string(), serde_json::Value::Array(list));
    }

    /// Linked source item ids of a brain block.
    pub fn linked_items(&self) -> Vec<String> {
        self.metadata
            .get(LINKED_ITEMS_KEY)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Move the parse pipeline forward, rejecting illegal transitions.
    pub fn set_parsing_status(&mut self, next: ParsingStatus) -> Result<(), StatusTransitionError> {
        if !self.kind.has_parsing_status() {
            return Err(StatusTransitionError::Unsupported(self.kind));
        }
        let current = self.parsing_status.unwrap_or_default();
        if !current.can_transition_to(next) {
            return Err(StatusTransitionError::Invalid { from: current, to: next });
        }
        self.parsing_status = Some(next);
        Ok(())
    }
}

/// Caller-supplied values that replace the per-kind defaults in
/// [`create_block`]. Unset fields keep the default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockOverrides {
    pub title: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub file_url: Option<String>,
    pub instruction_prompt: Option<String>,
    pub size: Option<Size>,
    pub parsing_status: Option<ParsingStatus>,
    pub metadata: Metadata,
}

impl BlockOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn file_url(mut self, file_url: impl Into<String>) -> Self {
        self.file_url = Some(file_url.into());
        self
    }

    pub fn instruction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.instruction_prompt = Some(prompt.into());
        self
    }

    pub fn size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn parsing_status(mut self, status: ParsingStatus) -> Self {
        self.parsing_status = Some(status);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A present `null` means "clear" (`Some(None)`); only an absent field means
/// "leave untouched".
fn clearable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Create a new block with kind-appropriate defaults.
///
/// Pure: assigns a fresh id and timestamp, never talks to persistence.
/// `parsing_status` starts at `none` for document/url and is dropped for
/// every other kind even when an override supplies one.
pub fn create_block(kind: BlockKind, position: CanvasPoint, overrides: BlockOverrides) -> Block {
    let parsing_status = kind
        .has_parsing_status()
        .then(|| overrides.parsing_status.unwrap_or_default());
    Block {
        id: BlockId::new(),
        kind,
        position,
        size: Some(overrides.size.unwrap_or_else(|| kind.default_size())),
        title: overrides
            .title
            .unwrap_or_else(|| kind.default_title().to_string()),
        content: overrides.content.unwrap_or_default(),
        url: overrides.url,
        file_url: overrides.file_url,
        instruction_prompt: overrides.instruction_prompt,
        parsing_status,
        metadata: overrides.metadata,
        created_at: crate::now_millis(),
    }
}

/// Partial update of a block's editable fields.
///
/// `None` leaves a field untouched. For clearable fields the inner option
/// distinguishes "set" (`Some(Some(v))`) from "clear" (`Some(None)`).
/// Kind and id are never patchable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub url: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub file_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub instruction_prompt: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsing_status: Option<ParsingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl BlockPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn url(mut self, url: Option<String>) -> Self {
        self.url = Some(url);
        self
    }

    pub fn file_url(mut self, file_url: Option<String>) -> Self {
        self.file_url = Some(file_url);
        self
    }

    pub fn instruction_prompt(mut self, prompt: Option<String>) -> Self {
        self.instruction_prompt = Some(prompt);
        self
    }

    pub fn size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn parsing_status(mut self, status: ParsingStatus) -> Self {
        self.parsing_status = Some(status);
        self
    }

    /// Replace the whole metadata bag.
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Patch that turns `before` into `after`. Position, id and kind are
    /// not covered; a size can be set but never cleared.
    pub fn between(before: &Block, after: &Block) -> Self {
        let mut patch = Self::new();
        if before.title != after.title {
            patch.title = Some(after.title.clone());
        }
        if before.content != after.content {
            patch.content = Some(after.content.clone());
        }
        if before.url != after.url {
            patch.url = Some(after.url.clone());
        }
        if before.file_url != after.file_url {
            patch.file_url = Some(after.file_url.clone());
        }
        if before.instruction_prompt != after.instruction_prompt {
            patch.instruction_prompt = Some(after.instruction_prompt.clone());
        }
        if before.size != after.size {
            patch.size = after.size;
        }
        if before.parsing_status != after.parsing_status {
            patch.parsing_status = after.parsing_status;
        }
        if before.metadata != after.metadata {
            patch.metadata = Some(after.metadata.clone());
        }
        patch
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether applying this patch can change aggregated context output.
    pub fn touches_context(&self) -> bool {
        self.title.is_some()
            || self.content.is_some()
            || self.url.is_some()
            || self.file_url.is_some()
            || self.instruction_prompt.is_some()
            || self.metadata.is_some()
    }

    /// Apply to a block. Parsing status is copied as-is; callers validate
    /// transitions with [`Block::set_parsing_status`] first.
    pub fn apply(&self, block: &mut Block) {
        if let Some(title) = &self.title {
            block.title = title.clone();
        }
        if let Some(content) = &self.content {
            block.content = content.clone();
        }
        if let Some(url) = &self.url {
            block.url = url.clone();
        }
        if let Some(file_url) = &self.file_url {
            block.file_url = file_url.clone();
        }
        if let Some(prompt) = &self.instruction_prompt {
            block.instruction_prompt = prompt.clone();
        }
        if let Some(size) = self.size {
            block.size = Some(size);
        }
        if let Some(status) = self.parsing_status {
            if block.kind.has_parsing_status() {
                block.parsing_status = Some(status);
            }
        }
        if let Some(metadata) = &self.metadata {
            block.metadata = metadata.clone();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

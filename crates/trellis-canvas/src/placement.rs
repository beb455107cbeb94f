//! Placement: where a new block lands, and what a drop turns into.
//!
//! Two insertion paths:
//!
//! - **Toolbar**: no coordinate supplied, so the block goes to a random point
//!   inside the placement window so repeated adds do not stack exactly.
//! - **Drop**: the pointer's viewport pixel is converted to canvas space with
//!   [`screen_to_canvas`], and the payload's discriminator picks the kind.
//!
//! Neither path touches persistence or the graph; the controller admits the
//! resulting block.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use trellis_types::{
    Block, BlockKind, BlockOverrides, CanvasPoint, LINKED_ITEMS_KEY, ParsingStatus, ScreenPoint, Size,
    create_block,
};

use crate::config::{CanvasConfig, PlacementWindow};

/// Current pan/zoom of the canvas viewport.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Top-left of the canvas container in page pixels. `None` until the
    /// container is mounted.
    pub origin: Option<ScreenPoint>,
    /// Pan offset in pixels.
    pub pan: ScreenPoint,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            origin: Some(ScreenPoint::default()),
            pan: ScreenPoint::default(),
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(origin: ScreenPoint, pan: ScreenPoint, zoom: f64) -> Self {
        Self {
            origin: Some(origin),
            pan,
            zoom,
        }
    }

    /// A viewport whose container is not mounted yet.
    pub fn unmounted() -> Self {
        Self {
            origin: None,
            ..Self::default()
        }
    }
}

/// Convert a viewport pixel to canvas space:
/// `(point - origin - pan) / zoom`.
///
/// Returns `None` when the origin is unknown, the zoom is not positive, or
/// the result is not finite.
pub fn screen_to_canvas(point: ScreenPoint, viewport: &Viewport) -> Option<CanvasPoint> {
    let origin = viewport.origin?;
    if viewport.zoom.is_nan() || viewport.zoom <= 0.0 {
        return None;
    }
    let canvas = CanvasPoint::new(
        (point.x - origin.x - viewport.pan.x) / viewport.zoom,
        (point.y - origin.y - viewport.pan.y) / viewport.zoom,
    );
    canvas.is_finite().then_some(canvas)
}

/// Why a drop produced no block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("viewport transform unavailable")]
    Unresolved,
    #[error("unknown drop payload: {0}")]
    UnknownPayload(String),
}

/// Something dragged onto the canvas from outside it.
///
/// `item` is the source record as-is. Known fields are read with both
/// camelCase and snake_case spellings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DropPayload {
    pub discriminator: String,
    #[serde(default)]
    pub item: Value,
}

impl DropPayload {
    pub fn new(discriminator: impl Into<String>, item: Value) -> Self {
        Self {
            discriminator: discriminator.into(),
            item,
        }
    }

    fn field(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .filter_map(|name| self.item.get(*name))
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn title(&self) -> Option<String> {
        self.field(&["title", "name"])
    }

    fn description(&self) -> Option<String> {
        self.field(&["description", "content", "text"])
    }

    fn file_url(&self) -> Option<String> {
        self.field(&["fileUrl", "file_url", "url"])
    }

    fn media_kind(&self) -> Option<String> {
        self.field(&["kind", "mediaType", "media_type", "type"])
    }

    /// Map the discriminator to a block kind and seeded fields.
    fn seed(&self) -> Option<(BlockKind, BlockOverrides)> {
        let mut overrides = BlockOverrides::new();
        if let Some(title) = self.title() {
            overrides = overrides.title(title);
        }

        let kind = match self.discriminator.as_str() {
            "reference-document" | "knowledge" => {
                if let Some(text) = self.description() {
                    overrides = overrides.content(text);
                }
                if let Some(id) = self.field(&["id"]) {
                    overrides = overrides.metadata(LINKED_ITEMS_KEY, Value::Array(vec![Value::String(id)]));
                }
                BlockKind::Brain
            }
            "media" => match self.media_kind().as_deref() {
                Some(k) if k.eq_ignore_ascii_case("image") => {
                    if let Some(url) = self.file_url() {
                        overrides = overrides.file_url(url);
                    }
                    BlockKind::Image
                }
                Some(k) if k.eq_ignore_ascii_case("video") => {
                    if let Some(url) = self.file_url() {
                        overrides = overrides.file_url(url);
                    }
                    BlockKind::Video
                }
                _ => {
                    if let Some(text) = self.description() {
                        overrides = overrides.content(text);
                    }
                    BlockKind::Brain
                }
            },
            "note" => {
                if let Some(text) = self.description() {
                    overrides = overrides.content(text);
                }
                BlockKind::Text
            }
            "link" => {
                if let Some(url) = self.file_url() {
                    overrides = overrides.url(url);
                }
                BlockKind::Url
            }
            "document" => {
                if let Some(url) = self.file_url() {
                    overrides = overrides.file_url(url);
                }
                overrides = overrides.parsing_status(ParsingStatus::Pending);
                BlockKind::Document
            }
            _ => return None,
        };
        Some((kind, overrides))
    }
}

/// Turns insertion requests into positioned blocks.
#[derive(Debug, Clone)]
pub struct PlacementResolver {
    window: PlacementWindow,
    sizes: HashMap<BlockKind, Size>,
    rng: StdRng,
}

impl Default for PlacementResolver {
    fn default() -> Self {
        Self::new(PlacementWindow::default())
    }
}

impl PlacementResolver {
    /// An unusable window falls back to the default one.
    pub fn new(window: PlacementWindow) -> Self {
        Self::with_rng(window, StdRng::from_entropy())
    }

    pub fn from_config(config: &CanvasConfig) -> Self {
        let mut resolver = Self::new(config.placement);
        resolver.sizes = BlockKind::ALL
            .into_iter()
            .map(|kind| (kind, config.size_for(kind)))
            .collect();
        resolver
    }

    /// Deterministic placement for tests and replays.
    pub fn seeded(window: PlacementWindow, seed: u64) -> Self {
        Self::with_rng(window, StdRng::seed_from_u64(seed))
    }

    fn with_rng(window: PlacementWindow, rng: StdRng) -> Self {
        let window = if window.is_valid() {
            window
        } else {
            tracing::warn!(min = window.min, max = window.max, "invalid placement window, using default");
            PlacementWindow::default()
        };
        Self {
            window,
            sizes: HashMap::new(),
            rng,
        }
    }

    pub fn window(&self) -> PlacementWindow {
        self.window
    }

    /// A point with both coordinates in `[min, max)`.
    pub fn random_position(&mut self) -> CanvasPoint {
        let PlacementWindow { min, max } = self.window;
        CanvasPoint::new(self.rng.gen_range(min..max), self.rng.gen_range(min..max))
    }

    /// Build a block for a toolbar add, at `position` or a random point.
    pub fn resolve_toolbar(
        &mut self,
        kind: BlockKind,
        position: Option<CanvasPoint>,
        overrides: BlockOverrides,
    ) -> Block {
        let position = position.unwrap_or_else(|| self.random_position());
        self.build(kind, position, overrides)
    }

    /// Build a block for a drop at the viewport pixel `point`.
    pub fn resolve_drop(
        &self,
        payload: &DropPayload,
        point: ScreenPoint,
        viewport: &Viewport,
    ) -> Result<Block, PlacementError> {
        let position = screen_to_canvas(point, viewport).ok_or(PlacementError::Unresolved)?;
        let (kind, overrides) = payload
            .seed()
            .ok_or_else(|| PlacementError::UnknownPayload(payload.discriminator.clone()))?;
        Ok(self.build(kind, position, overrides))
    }

    fn build(&self, kind: BlockKind, position: CanvasPoint, mut overrides: BlockOverrides) -> Block {
        if overrides.size.is_none() {
            overrides.size = self.sizes.get(&kind).copied();
        }
        create_block(kind, position, overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drop_at_origin(payload: DropPayload) -> Result<Block, PlacementError> {
        PlacementResolver::default().resolve_drop(&payload, ScreenPoint::new(10.0, 20.0), &Viewport::default())
    }

    #[test]
    fn test_screen_to_canvas_transform() {
        let viewport = Viewport::new(ScreenPoint::new(50.0, 40.0), ScreenPoint::new(10.0, -20.0), 2.0);
        let point = screen_to_canvas(ScreenPoint::new(260.0, 160.0), &viewport).unwrap();
        assert_eq!(point, CanvasPoint::new(100.0, 70.0));
    }

    #[test]
    fn test_screen_to_canvas_identity() {
        let point = screen_to_canvas(ScreenPoint::new(3.5, 7.0), &Viewport::default()).unwrap();
        assert_eq!(point, CanvasPoint::new(3.5, 7.0));
    }

    #[test]
    fn test_screen_to_canvas_unresolved() {
        let p = ScreenPoint::new(1.0, 1.0);
        assert!(screen_to_canvas(p, &Viewport::unmounted()).is_none());

        let zero_zoom = Viewport::new(ScreenPoint::default(), ScreenPoint::default(), 0.0);
        assert!(screen_to_canvas(p, &zero_zoom).is_none());

        let nan_zoom = Viewport::new(ScreenPoint::default(), ScreenPoint::default(), f64::NAN);
        assert!(screen_to_canvas(p, &nan_zoom).is_none());

        let nan_point = ScreenPoint::new(f64::NAN, 0.0);
        assert!(screen_to_canvas(nan_point, &Viewport::default()).is_none());
    }

    #[test]
    fn test_random_position_stays_in_window() {
        let mut resolver = PlacementResolver::seeded(PlacementWindow::default(), 7);
        for _ in 0..500 {
            let p = resolver.random_position();
            assert!((100.0..500.0).contains(&p.x), "x out of window: {}", p.x);
            assert!((100.0..500.0).contains(&p.y), "y out of window: {}", p.y);
        }
    }

    #[test]
    fn test_seeded_placement_is_reproducible() {
        let mut a = PlacementResolver::seeded(PlacementWindow::default(), 42);
        let mut b = PlacementResolver::seeded(PlacementWindow::default(), 42);
        assert_eq!(a.random_position(), b.random_position());
    }

    #[test]
    fn test_invalid_window_falls_back() {
        let resolver = PlacementResolver::new(PlacementWindow { min: 5.0, max: 5.0 });
        assert_eq!(resolver.window(), PlacementWindow::default());
    }

    #[test]
    fn test_unbounded_width_window_falls_back() {
        let huge = PlacementWindow { min: -1e308, max: 1e308 };
        let mut resolver = PlacementResolver::seeded(huge, 3);
        assert_eq!(resolver.window(), PlacementWindow::default());
        let p = resolver.random_position();
        assert!((100.0..500.0).contains(&p.x));
    }

    #[test]
    fn test_toolbar_explicit_position_wins() {
        let mut resolver = PlacementResolver::default();
        let block = resolver.resolve_toolbar(
            BlockKind::Text,
            Some(CanvasPoint::new(1.0, 2.0)),
            BlockOverrides::new(),
        );
        assert_eq!(block.position, CanvasPoint::new(1.0, 2.0));
        assert_eq!(block.title, "Text Block");
    }

    #[test]
    fn test_config_sizes_apply() {
        let mut config = CanvasConfig::default();
        config.default_sizes.insert(BlockKind::Chat, Size::new(480.0, 600.0));
        let mut resolver = PlacementResolver::from_config(&config);
        let block = resolver.resolve_toolbar(BlockKind::Chat, None, BlockOverrides::new());
        assert_eq!(block.size, Some(Size::new(480.0, 600.0)));
        let text = resolver.resolve_toolbar(BlockKind::Text, None, BlockOverrides::new());
        assert_eq!(text.size, Some(BlockKind::Text.default_size()));
    }

    #[test]
    fn test_reference_document_becomes_brain() {
        let block = drop_at_origin(DropPayload::new(
            "reference-document",
            json!({"id": "doc-17", "title": "Brand guide", "description": "Use blue."}),
        ))
        .unwrap();
        assert_eq!(block.kind, BlockKind::Brain);
        assert_eq!(block.linked_items(), vec!["doc-17".to_string()]);
        assert_eq!(block.title, "Brand guide");
        assert_eq!(block.content, "Use blue.");
        assert_eq!(block.position, CanvasPoint::new(10.0, 20.0));
    }

    #[test]
    fn test_media_image_and_fallback() {
        let image = drop_at_origin(DropPayload::new(
            "media",
            json!({"kind": "image", "fileUrl": "http://x/y.png"}),
        ))
        .unwrap();
        assert_eq!(image.kind, BlockKind::Image);
        assert_eq!(image.file_url.as_deref(), Some("http://x/y.png"));

        let video = drop_at_origin(DropPayload::new(
            "media",
            json!({"media_type": "VIDEO", "file_url": "http://x/v.mp4"}),
        ))
        .unwrap();
        assert_eq!(video.kind, BlockKind::Video);

        let other = drop_at_origin(DropPayload::new(
            "media",
            json!({"kind": "audio", "description": "podcast"}),
        ))
        .unwrap();
        assert_eq!(other.kind, BlockKind::Brain);
        assert_eq!(other.content, "podcast");
    }

    #[test]
    fn test_document_drop_starts_pending() {
        let block = drop_at_origin(DropPayload::new("document", json!({"url": "http://x/a.pdf"}))).unwrap();
        assert_eq!(block.kind, BlockKind::Document);
        assert_eq!(block.parsing_status, Some(ParsingStatus::Pending));
        assert_eq!(block.resource_url(), Some("http://x/a.pdf"));
    }

    #[test]
    fn test_unknown_discriminator_is_rejected() {
        let err = drop_at_origin(DropPayload::new("spreadsheet", json!({}))).unwrap_err();
        assert_eq!(err, PlacementError::UnknownPayload("spreadsheet".into()));
    }

    #[test]
    fn test_unmounted_viewport_is_unresolved() {
        let err = PlacementResolver::default()
            .resolve_drop(
                &DropPayload::new("note", json!({})),
                ScreenPoint::new(0.0, 0.0),
                &Viewport::unmounted(),
            )
            .unwrap_err();
        assert_eq!(err, PlacementError::Unresolved);
    }

    #[test]
    fn test_payload_deserializes_without_item() {
        let payload: DropPayload = serde_json::from_str(r#"{"discriminator": "note"}"#).unwrap();
        assert_eq!(payload.item, Value::Null);
        let block = drop_at_origin(payload).unwrap();
        assert_eq!(block.kind, BlockKind::Text);
        assert!(block.content.is_empty());
    }
}

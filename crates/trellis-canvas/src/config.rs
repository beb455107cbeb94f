//! Engine configuration, loaded from RON.
//!
//! Every field has a default, so an empty document (`()`) is a valid config:
//!
//! ```ron
//! (
//!     history_depth: 100,
//!     placement: (min: 50.0, max: 400.0),
//!     default_sizes: { chat: (width: 480.0, height: 600.0) },
//! )
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use trellis_types::{BlockKind, Size};

/// Default maximum number of undo snapshots.
pub const DEFAULT_HISTORY_DEPTH: usize = 50;

/// Default separator between aggregated context segments.
pub const DEFAULT_CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Default event bus capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Half-open window `[min, max)` used for toolbar placement on both axes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementWindow {
    pub min: f64,
    pub max: f64,
}

impl Default for PlacementWindow {
    fn default() -> Self {
        Self { min: 100.0, max: 500.0 }
    }
}

impl PlacementWindow {
    /// A usable window has finite bounds with `min < max` and a finite width.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.min < self.max
            && (self.max - self.min).is_finite()
    }
}

/// Canvas engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Maximum undo snapshots kept; the oldest is dropped past this.
    pub history_depth: usize,
    pub placement: PlacementWindow,
    /// Broadcast capacity of the structural-change bus.
    pub event_capacity: usize,
    /// Joins aggregated context segments.
    pub context_separator: String,
    /// Per-kind size overrides for new blocks.
    pub default_sizes: HashMap<BlockKind, Size>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            history_depth: DEFAULT_HISTORY_DEPTH,
            placement: PlacementWindow::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            context_separator: DEFAULT_CONTEXT_SEPARATOR.to_string(),
            default_sizes: HashMap::new(),
        }
    }
}

impl CanvasConfig {
    /// Parse from a RON string.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: CanvasConfig = ron::from_str(text)?;
        config.validate()
    }

    /// Load from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Size for a new block of `kind`, honoring overrides.
    pub fn size_for(&self, kind: BlockKind) -> Size {
        self.default_sizes
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_size())
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.history_depth == 0 {
            return Err(ConfigError::Invalid("history_depth must be at least 1".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be at least 1".into()));
        }
        if !self.placement.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "placement window [{}, {}) is empty or unbounded",
                self.placement.min, self.placement.max
            )));
        }
        Ok(self)
    }
}

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_is_default() {
        let config = CanvasConfig::from_ron_str("()").unwrap();
        assert_eq!(config, CanvasConfig::default());
        assert_eq!(config.history_depth, 50);
        assert_eq!(config.context_separator, "\n\n---\n\n");
    }

    #[test]
    fn test_partial_overrides() {
        let config = CanvasConfig::from_ron_str(
            r#"(
                history_depth: 10,
                placement: (max: 300.0),
                default_sizes: { chat: (width: 480.0, height: 600.0) },
            )"#,
        )
        .unwrap();
        assert_eq!(config.history_depth, 10);
        assert_eq!(config.placement, PlacementWindow { min: 100.0, max: 300.0 });
        assert_eq!(config.size_for(BlockKind::Chat), Size::new(480.0, 600.0));
        assert_eq!(config.size_for(BlockKind::Text), BlockKind::Text.default_size());
    }

    #[test]
    fn test_rejects_zero_depth_and_empty_window() {
        assert!(matches!(
            CanvasConfig::from_ron_str("(history_depth: 0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CanvasConfig::from_ron_str("(placement: (min: 5.0, max: 5.0))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CanvasConfig::from_ron_str("(placement: (min: -1e308, max: 1e308))"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            CanvasConfig::from_ron_str("(history_depth: \"lots\")"),
            Err(ConfigError::Ron(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(event_capacity: 8)").unwrap();
        let config = CanvasConfig::load(file.path()).unwrap();
        assert_eq!(config.event_capacity, 8);

        assert!(matches!(
            CanvasConfig::load("/nonexistent/trellis.ron"),
            Err(ConfigError::Io(_))
        ));
    }
}

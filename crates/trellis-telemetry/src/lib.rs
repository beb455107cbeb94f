//! Logging setup for applications embedding trellis.
//!
//! The engine crates only emit `tracing` events. Embedders call
//! [`init_logging`] once at startup to install a subscriber:
//!
//! - `RUST_LOG` wins when set; otherwise [`LogConfig::default_filter`]
//! - a stderr `fmt` layer
//! - an optional non-blocking file layer when a log directory is configured
//!
//! ```bash
//! TRELLIS_LOG_DIR=/tmp RUST_LOG=trellis_canvas=debug my-canvas-app
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming the log directory.
pub const LOG_DIR_ENV: &str = "TRELLIS_LOG_DIR";

/// Subscriber settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directives used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Write `file_name` here in addition to stderr.
    pub log_dir: Option<PathBuf>,
    pub file_name: String,
    /// Colors on the stderr layer. The file layer never has them.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_filter: "trellis_canvas=info,trellis_types=info,warn".to_string(),
            log_dir: None,
            file_name: "trellis.log".to_string(),
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Defaults, with the log directory taken from `TRELLIS_LOG_DIR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            log_dir: lookup(LOG_DIR_ENV).filter(|d| !d.is_empty()).map(PathBuf::from),
            ..Self::default()
        }
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Full path of the log file, if file logging is on.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_dir.as_ref().map(|dir| dir.join(&self.file_name))
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the program: dropping it
/// flushes and stops the file writer. If a global subscriber is already set
/// the call is a no-op apart from the file writer it created.
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, &config.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(config.ansi))
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        if let Some(path) = config.log_path() {
            tracing::info!("logging to {}", path.display());
        }
    }
    guard
}

//! Logging setup for harnesses embedding the store
//!
//! The library only emits `tracing` events. Binaries and test suites that
//! want to see them call [`init_logging`] once; later calls are no-ops.

use tracing::{Level, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::TopoConfig;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is unset
    pub level: Level,
    pub with_target: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            with_target: true,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// An unparseable `log_level` falls back to INFO with a warning
    pub fn from_config(config: &TopoConfig) -> Self {
        let level = config.log_level.parse().unwrap_or_else(|_| {
            warn!(log_level = %config.log_level, "Unknown log level, using info");
            Level::INFO
        });
        Self {
            level,
            ..Default::default()
        }
    }

    /// Compact, colourless output suited to captured test logs
    pub fn for_tests() -> Self {
        Self {
            level: Level::DEBUG,
            with_target: true,
            ansi: false,
        }
    }
}

/// Install the global subscriber. Returns false if one was already set.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
    let layer = fmt::layer()
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .with_filter(filter);

    tracing_subscriber::registry().with(layer).try_init().is_ok()
}

//! Store configuration
//!
//! Sources are layered: built-in defaults, then an optional file, then
//! `ARBOR_*` environment variables (`__` separates nested keys, `ARBOR_CELLS`
//! takes a comma separated list).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use arbor_common::GLOBAL_CELL;
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::Level;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TopoConfig {
    /// Cells created at startup, in addition to the global cell
    pub cells: Vec<String>,
    /// Upper bound on a lock wait when the caller supplies no deadline
    pub lock_wait_timeout_ms: Option<u64>,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for TopoConfig {
    fn default() -> Self {
        Self {
            cells: vec![GLOBAL_CELL.to_string()],
            lock_wait_timeout_ms: None,
            log_level: "info".to_string(),
        }
    }
}

impl TopoConfig {
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("ARBOR")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cells")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .context("failed to read arbor configuration")?;
        let config: Self = settings
            .try_deserialize()
            .context("invalid arbor configuration")?;
        if config.log_level.parse::<Level>().is_err() {
            bail!("invalid log_level '{}'", config.log_level);
        }
        Ok(config)
    }

    pub fn lock_wait_timeout(&self) -> Option<Duration> {
        self.lock_wait_timeout_ms.map(Duration::from_millis)
    }
}

//! Settings file.
//!
//! ```toml
//! game = "Deus Ex: Human Revolution"
//! preset = "AQ..."
//!
//! [session]
//! spawn_interval_ms = 15000
//!
//! [session.retry]
//! strategy = "fixed"
//! delay_ms = 2000
//! max_retries = 10
//! ```

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use pandemonium_core::SessionConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Game id or name
    pub game: Option<String>,
    /// Preset token
    pub preset: Option<String>,
    pub session: SessionConfig,
}

impl Settings {
    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

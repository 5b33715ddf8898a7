// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! relayd configuration.
//!
//! ```toml
//! call_timeout_ms = 5000
//! strict_sync = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Bound on one downstream call. Must exceed dmad's own sync bound.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 5_000;

/// Errors raised while loading the relay configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid relay TOML.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: toml::de::Error,
    },
}

/// Relay settings.
///
/// The engine id is not configured here: every caller names it in its request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Bound on each downstream call in milliseconds; `0` blocks indefinitely.
    pub call_timeout_ms: u64,
    /// Fail the whole transfer when its SYNC step fails.
    pub strict_sync: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS, strict_sync: false }
    }
}

impl RelayConfig {
    /// Loads a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Downstream call bound, `None` when calls block.
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms != 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }
}

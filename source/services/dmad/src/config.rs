// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! dmad configuration: hardware backend, sync bound and engine layout.
//!
//! ```toml
//! backend = "sim"
//! sync_timeout_us = 3000000
//!
//! [[engine]]
//! id = 0
//! base = 0xA0000000
//! source_addr = 0x40000000
//! dest_addr = 0x30000000
//! region_len = 0x10000
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Bound used by SYNC when the config does not set one.
pub const DEFAULT_SYNC_TIMEOUT_US: u64 = 3_000_000;
pub const DEFAULT_WINDOW_BASE: u64 = 0xA000_0000;
pub const DEFAULT_SOURCE_ADDR: u64 = 0x4000_0000;
pub const DEFAULT_DEST_ADDR: u64 = 0x3000_0000;
pub const DEFAULT_REGION_LEN: usize = 0x1_0000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where device windows and DMA regions come from.
///
/// `devmem` needs the `devmem` feature on Linux; otherwise [`crate::run`] and
/// the `dmad` binary fail with `BackendUnavailable`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process simulated engines over host memory.
    #[default]
    Sim,
    /// Physical mappings through `/dev/mem`.
    DevMem,
}

/// Physical layout of one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub id: u32,
    /// Base of the register window.
    pub base: u64,
    /// Staging region read by the HostToDevice channel.
    pub source_addr: u64,
    /// Region written by the DeviceToHost channel.
    pub dest_addr: u64,
    #[serde(default = "default_region_len")]
    pub region_len: usize,
}

fn default_region_len() -> usize {
    DEFAULT_REGION_LEN
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id: 0,
            base: DEFAULT_WINDOW_BASE,
            source_addr: DEFAULT_SOURCE_ADDR,
            dest_addr: DEFAULT_DEST_ADDR,
            region_len: DEFAULT_REGION_LEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub backend: Backend,
    pub sync_timeout_us: u64,
    #[serde(rename = "engine")]
    pub engines: Vec<EngineConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sim,
            sync_timeout_us: DEFAULT_SYNC_TIMEOUT_US,
            engines: vec![EngineConfig::default()],
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: Self = toml::from_str(&data)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_micros(self.sync_timeout_us)
    }

    pub fn engine(&self, id: u32) -> Option<&EngineConfig> {
        self.engines.iter().find(|engine| engine.id == id)
    }

    /// Rejects layouts the engine cannot address: the address registers are 32 bits wide.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for engine in &self.engines {
            if !seen.insert(engine.id) {
                return Err(ConfigError::Invalid(format!("duplicate engine id {}", engine.id)));
            }
            if engine.region_len == 0 {
                return Err(ConfigError::Invalid(format!("engine {}: empty region", engine.id)));
            }
            let len = engine.region_len as u64;
            for (name, addr) in [("source_addr", engine.source_addr), ("dest_addr", engine.dest_addr)]
            {
                if addr.saturating_add(len) > 1 << 32 {
                    return Err(ConfigError::Invalid(format!(
                        "engine {}: {name} {addr:#x}+{len:#x} exceeds 32-bit DMA addressing",
                        engine.id
                    )));
                }
            }
            let (src, dst) = (engine.source_addr, engine.dest_addr);
            if src < dst + len && dst < src + len {
                return Err(ConfigError::Invalid(format!(
                    "engine {}: source and destination regions overlap",
                    engine.id
                )));
            }
        }
        Ok(())
    }
}

//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use opener_engine::CatalogConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// What to do with an ability line identical to the one that last advanced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Ignore a line with the same timestamp, source and ability
    #[default]
    SameTimestamp,
    /// Every matching line advances
    AlwaysAdvance,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    /// Flag the expected action as missed on the first mismatch at each step
    #[serde(default)]
    pub mark_missed_on_mismatch: bool,
    /// Prefer a zone-specific opener over the job default
    #[serde(default)]
    pub prefer_zone_openers: bool,
    #[serde(default = "default_roster_timeout")]
    pub roster_timeout_ms: u64,
}

fn default_roster_timeout() -> u64 {
    2000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::default(),
            mark_missed_on_mismatch: false,
            prefer_zone_openers: false,
            roster_timeout_ms: default_roster_timeout(),
        }
    }
}

impl BridgeConfig {
    pub fn roster_timeout(&self) -> Duration {
        Duration::from_millis(self.roster_timeout_ms)
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<()> {
    if config.bridge.roster_timeout_ms == 0 {
        bail!("bridge.roster_timeout_ms must be greater than zero");
    }
    for dir in &config.catalog.directories {
        if !dir.is_dir() {
            bail!("catalog directory does not exist: {:?}", dir);
        }
    }
    Ok(())
}

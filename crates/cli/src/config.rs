//! Configuration management for the CLI
//!
//! Sources, lowest precedence first:
//! 1. `~/.config/spt/config.toml` (optional)
//! 2. the file given with `--config`
//! 3. `SPT_*` environment variables (`SPT_API_URL`, `SPT_ADVISOR__SAMPLER__INTERVAL_MS`, ...)
//! 4. command-line flags, applied by the caller

use advisor_lib::AdvisorConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "https://cloud.mongodb.com";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub api_url: Option<String>,
    pub project_id: Option<String>,
    pub workspace: Option<String>,
    pub api_token: Option<String>,
    /// Directory holding `<processor>.json` pipeline definitions
    pub registry_dir: Option<PathBuf>,
    pub advisor: AdvisorConfig,
}

impl Settings {
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(default_config_path().as_deref(), explicit, true)
    }

    pub fn load_from(default: Option<&Path>, explicit: Option<&Path>, with_env: bool) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = default {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }
        if with_env {
            builder = builder.add_source(
                config::Environment::with_prefix("SPT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let settings = builder.build().context("Failed to load configuration")?;
        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.registry_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("processors"))
    }
}

/// Get the default configuration file path
fn default_config_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(".config").join("spt").join("config.toml"))
}

/// `load_config` module: Loads an optional YAML file with publishing defaults
/// and turns it into the knobs of a [`StageConfig`](docstage_core::StageConfig).
///
/// This module is the only place where user-supplied YAML is parsed.
///
/// # Responsibilities
/// - Parse the YAML file into [`CliConfig`], filling every missing field with its default
/// - Validate the cache-control glob table before any store I/O happens
/// - Resolve the username from flag, file or `USER` environment variable
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics,
/// and are surfaced at the CLI boundary.
///
/// Accepted schema:
///
/// ```yaml
/// username: alice
/// danger_threshold: 500
/// workers: 5
/// retries: 1
/// multipart_chunk_size: 8388608
/// cache_control:
///   - pattern: "*.html"
///     value: no-cache
/// ```
use anyhow::{Context, Result};
use docstage_core::cache_control::{CachePolicy, CacheRuleSpec};
use docstage_core::config::DEFAULT_DANGER_THRESHOLD;
use docstage_core::hash::DEFAULT_CHUNK_SIZE;
use docstage_core::pool::{PoolOptions, DEFAULT_RETRIES, DEFAULT_WORKERS};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub username: Option<String>,
    pub danger_threshold: usize,
    pub workers: usize,
    pub retries: usize,
    pub multipart_chunk_size: usize,
    /// Replaces the built-in table when non-empty.
    pub cache_control: Vec<CacheRuleSpec>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            username: None,
            danger_threshold: DEFAULT_DANGER_THRESHOLD,
            workers: DEFAULT_WORKERS,
            retries: DEFAULT_RETRIES,
            multipart_chunk_size: DEFAULT_CHUNK_SIZE,
            cache_control: Vec::new(),
        }
    }
}

impl CliConfig {
    pub fn pool(&self) -> PoolOptions {
        PoolOptions {
            workers: self.workers,
            retries: self.retries,
        }
    }

    pub fn cache_policy(&self) -> Result<CachePolicy> {
        if self.cache_control.is_empty() {
            return Ok(CachePolicy::default());
        }
        CachePolicy::from_specs(&self.cache_control).context("Invalid cache_control pattern")
    }

    /// `--username`, then the config file, then `$USER`.
    pub fn resolve_username(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.username.clone())
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_default()
    }
}

/// Loads a YAML config file. Every field is optional.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid, all-defaults config
    if config_content.trim().is_empty() {
        return Ok(CliConfig::default());
    }

    match serde_yaml::from_str::<CliConfig>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

/// Load `path` when given, otherwise the defaults.
pub fn load_optional_config(path: Option<&Path>) -> Result<CliConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(CliConfig::default()),
    }
}

// src/config.rs - Pipeline configuration loaded from TOML

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{OrganoidError, Result};
use crate::plugin::PluginConfig;

/// Raw per-plugin configuration tables, keyed `[plugins.<type>.<name>]`.
pub type PluginTables = BTreeMap<String, BTreeMap<String, BTreeMap<String, toml::Value>>>;

/// Configuration for an analysis run
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub input_path: String,
    pub output_dir: String,

    /// Base directory holding `checkpoints/` and `configs/` for the model
    /// manager.
    #[serde(default = "default_model_path")]
    pub model_path: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub gpu_enabled: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,

    /// Worker count for batch execution; hardware concurrency when unset.
    #[serde(default)]
    pub num_workers: Option<usize>,

    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,

    /// Directory for the persisted result cache; in-memory only when unset.
    #[serde(default)]
    pub cache_dir: Option<String>,

    #[serde(default = "default_plugin_type")]
    pub plugin_type: String,

    #[serde(default = "default_plugin_name")]
    pub plugin_name: String,

    /// Segmentation components below this pixel count are treated as noise.
    #[serde(default = "default_min_region_size")]
    pub min_region_size: usize,

    /// Treat the input set as an ordered time series and derive growth and
    /// morphology trends after the per-image pass.
    #[serde(default)]
    pub time_series_enabled: bool,

    /// Per-plugin configuration blocks, validated against each plugin's
    /// required keys at construction.
    #[serde(default)]
    pub plugins: PluginTables,
}

fn default_model_path() -> String {
    "./models".to_string()
}

fn default_batch_size() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_parallel() -> bool {
    true
}

fn default_cache_max_size() -> usize {
    1000
}

fn default_plugin_type() -> String {
    "organoid".to_string()
}

fn default_plugin_name() -> String {
    "spheroid".to_string()
}

fn default_min_region_size() -> usize {
    16
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            OrganoidError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| OrganoidError::ConfigLoad {
            source: e,
            path: path.to_path_buf(),
        })?;

        Ok(config)
    }

    /// Create default configuration
    pub fn default() -> Self {
        Self {
            input_path: "./input".to_string(),
            output_dir: "./output".to_string(),
            model_path: default_model_path(),
            batch_size: default_batch_size(),
            gpu_enabled: false,
            log_level: default_log_level(),
            use_parallel: true,
            num_workers: None,
            cache_max_size: default_cache_max_size(),
            cache_dir: None,
            plugin_type: default_plugin_type(),
            plugin_name: default_plugin_name(),
            min_region_size: default_min_region_size(),
            time_series_enabled: false,
            plugins: PluginTables::new(),
        }
    }

    /// Configuration table for a specific plugin, empty if not present.
    pub fn plugin_config(&self, plugin_type: &str, plugin_name: &str) -> PluginConfig {
        self.plugins
            .get(plugin_type)
            .and_then(|by_name| by_name.get(plugin_name))
            .map(|table| PluginConfig::from_table(table.clone()))
            .unwrap_or_default()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let input_path = PathBuf::from(&self.input_path);
        if !input_path.exists() {
            return Err(OrganoidError::InvalidPath(input_path));
        }

        if self.batch_size == 0 {
            return Err(OrganoidError::Config(
                "batch_size must be > 0".to_string(),
            ));
        }

        if self.cache_max_size == 0 {
            return Err(OrganoidError::Config(
                "cache_max_size must be > 0".to_string(),
            ));
        }

        if let Some(workers) = self.num_workers {
            if workers == 0 {
                return Err(OrganoidError::Config(
                    "num_workers must be > 0 when set".to_string(),
                ));
            }
        }

        const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
        if !LEVELS.contains(&self.log_level.as_str()) {
            return Err(OrganoidError::Config(format!(
                "log_level must be one of {:?}, got '{}'",
                LEVELS, self.log_level
            )));
        }

        if self.min_region_size == 0 {
            return Err(OrganoidError::Config(
                "min_region_size must be > 0".to_string(),
            ));
        }

        fs::create_dir_all(&self.output_dir)?;

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| OrganoidError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content)?;

        Ok(())
    }
}

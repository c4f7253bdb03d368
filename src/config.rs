//! Layered application configuration.
//!
//! Values are merged in increasing priority:
//!
//! 1. Built-in defaults
//! 2. `config.toml` in the platform config directory, or the file given with `--config`
//! 3. `IMGDUPE_*` environment variables (`__` separates nested keys)
//! 4. Command-line flags, applied by the caller
//!
//! ```toml
//! database = "/photos/.imgdupe.sqlite"
//! table = "library"
//! io_threads = 8
//! policy = "fast"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::duplicates::Policy;
use crate::index::TableName;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "IMGDUPE_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Index database file.
    pub database: PathBuf,
    /// Table holding the index rows.
    pub table: String,
    /// Worker threads used for extraction and classification.
    pub io_threads: usize,
    pub policy: Policy,
    pub follow_symlinks: bool,
    pub skip_hidden: bool,
    /// Gitignore-style patterns excluded from every walk.
    pub ignore_patterns: Vec<String>,
    /// Directory timestamped JSON reports are written to.
    pub report_dir: PathBuf,
    /// Compute and store the four perceptual hashes on ingest.
    pub compute_perceptual: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("image_cache.sqlite"),
            table: "image_cache".to_string(),
            io_threads: 4,
            policy: Policy::Precise,
            follow_symlinks: false,
            skip_hidden: false,
            ignore_patterns: Vec::new(),
            report_dir: PathBuf::from("."),
            compute_perceptual: true,
        }
    }
}

impl Config {
    /// Load defaults, the config file and the environment.
    ///
    /// An explicit `path` must exist; the platform default file is optional.
    ///
    /// # Errors
    ///
    /// Fails if the explicit file is missing, any layer does not parse, or
    /// the result does not [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match path {
            Some(path) => {
                if !path.is_file() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(default_path) = Self::default_path() {
                    log::debug!("Looking for config at {}", default_path.display());
                    figment = figment.merge(Toml::file(default_path));
                }
            }
        }

        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Platform-specific `config.toml` location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "imgdupe", "imgdupe").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Fails on zero worker threads or a table name that is not a plain identifier.
    pub fn validate(&self) -> Result<()> {
        if self.io_threads == 0 {
            anyhow::bail!("io_threads must be at least 1");
        }
        self.table_name()?;
        Ok(())
    }

    /// The configured table as a validated identifier.
    ///
    /// # Errors
    ///
    /// Fails if `table` is not a valid SQL identifier.
    pub fn table_name(&self) -> Result<TableName> {
        TableName::new(&self.table).with_context(|| format!("Invalid table name '{}'", self.table))
    }

    /// Serialize to TOML, for writing a starter config file.
    ///
    /// # Errors
    ///
    /// Fails only if a value cannot be represented in TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

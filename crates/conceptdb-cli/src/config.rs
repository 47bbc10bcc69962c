//! Configuration for the ConceptDB CLI.
//!
//! Provides the [`ConceptDbConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `CONCEPTDB_CONFIG` environment variable
//! 3. XDG default: `~/.config/conceptdb/config.toml`
//! 4. Built-in defaults

use std::path::PathBuf;

use confyg::{Confygery, env};
use conceptdb::conceptdb_evolution::EvolutionConfig;
use conceptdb::conceptdb_router::RouterConfig;
use conceptdb::conceptdb_sync::SyncConfig;
use conceptdb::{Error, Result};
use serde::{Deserialize, Serialize};

/// Prefix for environment overrides and exported variables.
pub const ENV_PREFIX: &str = "CONCEPTDB";

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for the ConceptDB CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptDbConfig {
    /// JSON dataset seeding the precise store:
    /// `{"tables": {"name": [{row}, ...]}}`.
    pub dataset_path: Option<String>,

    /// Directory holding persisted state (`phase.json`).
    pub state_dir: Option<String>,

    /// Query router settings.
    pub router: RouterConfig,

    /// Sync manager settings.
    pub sync: SyncConfig,

    /// Phase manager settings.
    pub evolution: EvolutionConfig,
}

// ============================================================================
// Config loading
// ============================================================================

impl ConceptDbConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut env_opts = env::Options::with_top_level(ENV_PREFIX);
        env_opts.add_section("router");
        env_opts.add_section("sync");
        env_opts.add_section("evolution");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        Ok(config)
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("CONCEPTDB_CONFIG") {
            return Some(PathBuf::from(path));
        }
        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("conceptdb").join("config.toml"))
    }

    /// Directory for persisted state: `state_dir`, else the platform data
    /// directory.
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => dirs::data_dir()
                .map(|d| d.join("conceptdb"))
                .ok_or_else(|| Error::config("Could not determine data directory")),
        }
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Flatten this config into environment variable pairs with the
    /// `CONCEPTDB_` prefix.
    pub fn to_env_vars(&self) -> Result<Vec<(String, String)>> {
        let value = toml::Value::try_from(self).map_err(|e| Error::config(e.to_string()))?;
        let mut vars = Vec::new();
        flatten_toml_value(&value, ENV_PREFIX, &mut vars);
        Ok(vars)
    }
}

/// Recursively flatten a TOML value into `KEY=value` pairs.
fn flatten_toml_value(value: &toml::Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, val) in table {
                let env_key = format!("{}_{}", prefix, key.to_uppercase());
                flatten_toml_value(val, &env_key, out);
            }
        }
        toml::Value::Array(arr) => {
            if let Ok(json) = serde_json::to_string(arr) {
                out.push((prefix.to_string(), json));
            }
        }
        toml::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        toml::Value::Integer(i) => out.push((prefix.to_string(), i.to_string())),
        toml::Value::Float(f) => out.push((prefix.to_string(), f.to_string())),
        toml::Value::Boolean(b) => out.push((prefix.to_string(), b.to_string())),
        toml::Value::Datetime(dt) => out.push((prefix.to_string(), dt.to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================

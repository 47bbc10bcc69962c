//! Handler functions for config CLI commands.
//!
//! Implements `conceptdb config {path,get,init,export}`.

use std::path::PathBuf;

use conceptdb::{Error, Result};

use crate::cli::ConfigAction;
use crate::config::ConceptDbConfig;

// ============================================================================
// Command dispatch
// ============================================================================

/// Handle a config subcommand.
///
/// Receives the raw `--config` path (not a loaded config) because `path`
/// and `init` work before a config file exists.
pub fn handle_config_command(config_path: Option<&str>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => cmd_config_path(config_path),
        ConfigAction::Get { key } => {
            println!("{}", cmd_config_get(config_path, &key)?);
            Ok(())
        }
        ConfigAction::Init { file, force } => {
            let path = cmd_config_init(file.as_deref(), force)?;
            println!("Config file created at {}", path.display());
            Ok(())
        }
        ConfigAction::Export { docker_env } => {
            let config = ConceptDbConfig::load(config_path)?;
            for line in cmd_config_export(&config, docker_env)? {
                println!("{line}");
            }
            Ok(())
        }
    }
}

// ============================================================================
// Command handlers
// ============================================================================

fn cmd_config_path(config_path: Option<&str>) -> Result<()> {
    match ConceptDbConfig::resolve_config_path(config_path) {
        Some(path) => {
            println!("{}", path.display());
            if !path.exists() {
                eprintln!("(file does not exist; run `conceptdb config init` to create it)");
            }
            Ok(())
        }
        None => Err(Error::config(
            "Could not determine config directory for this platform",
        )),
    }
}

fn cmd_config_get(config_path: Option<&str>, key: &str) -> Result<String> {
    let config = ConceptDbConfig::load(config_path)?;
    let value = toml::Value::try_from(&config).map_err(|e| Error::config(e.to_string()))?;
    get_nested_value(&value, key)
        .map(format_toml_value)
        .ok_or_else(|| Error::config(format!("Key '{key}' not found in configuration")))
}

fn cmd_config_init(file: Option<&str>, force: bool) -> Result<PathBuf> {
    let path = match file {
        Some(p) => PathBuf::from(p),
        None => ConceptDbConfig::default_config_path()
            .ok_or_else(|| Error::config("Could not determine config directory"))?,
    };

    if path.exists() && !force {
        return Err(Error::config(format!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
    }

    let toml_str = ConceptDbConfig::default().to_toml_string()?;
    std::fs::write(&path, toml_str).map_err(|e| Error::io_with_path(e, &path))?;
    Ok(path)
}

fn cmd_config_export(config: &ConceptDbConfig, docker_env: bool) -> Result<Vec<String>> {
    Ok(config
        .to_env_vars()?
        .into_iter()
        .map(|(key, value)| {
            if docker_env {
                format!("--env {key}={value}")
            } else {
                format!("{key}={value}")
            }
        })
        .collect())
}

// ============================================================================
// TOML dotted-key helpers
// ============================================================================

fn get_nested_value<'a>(value: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.')
        .try_fold(value, |current, part| current.as_table()?.get(part))
}

fn format_toml_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(dt) => dt.to_string(),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            toml::to_string_pretty(value).unwrap_or_else(|_| format!("{value:?}"))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_default(dir: &TempDir) -> String {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, ConceptDbConfig::default().to_toml_string().unwrap()).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_cmd_config_path_explicit() {
        assert!(cmd_config_path(Some("/explicit/config.toml")).is_ok());
    }

    #[test]
    fn test_cmd_config_get_nested_key() {
        let dir = TempDir::new().unwrap();
        let path = write_default(&dir);
        assert_eq!(
            cmd_config_get(Some(&path), "router.search_limit").unwrap(),
            "10"
        );
        assert_eq!(
            cmd_config_get(Some(&path), "evolution.periodic_sync").unwrap(),
            "true"
        );
    }

    #[test]
    fn test_cmd_config_get_table() {
        let dir = TempDir::new().unwrap();
        let path = write_default(&dir);
        let table = cmd_config_get(Some(&path), "sync").unwrap();
        assert!(table.contains("batch_size = 100"));
    }

    #[test]
    fn test_cmd_config_get_missing_key() {
        let dir = TempDir::new().unwrap();
        let path = write_default(&dir);
        let err = cmd_config_get(Some(&path), "router.nonexistent").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_cmd_config_init_creates_and_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let file = path.to_str().unwrap();

        let created = cmd_config_init(Some(file), false).unwrap();
        assert_eq!(created, path);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[router]"));

        let err = cmd_config_init(Some(file), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(cmd_config_init(Some(file), true).is_ok());
    }

    #[test]
    fn test_cmd_config_export_formats() {
        let config = ConceptDbConfig::default();
        let plain = cmd_config_export(&config, false).unwrap();
        assert!(plain.contains(&"CONCEPTDB_ROUTER_SEARCH_LIMIT=10".to_string()));
        let docker = cmd_config_export(&config, true).unwrap();
        assert!(docker.iter().all(|l| l.starts_with("--env CONCEPTDB_")));
    }

    #[test]
    fn test_get_nested_value() {
        let value: toml::Value = toml::from_str("[a]\nb = 1\n").unwrap();
        assert_eq!(
            get_nested_value(&value, "a.b"),
            Some(&toml::Value::Integer(1))
        );
        assert!(get_nested_value(&value, "a.c").is_none());
        assert!(get_nested_value(&value, "a.b.c").is_none());
    }
}

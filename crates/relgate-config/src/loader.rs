//! Loads the configuration document and applies environment overrides.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::model::PipelineConfig;
use crate::validate::validate;

/// Environment variable naming the configuration document.
pub const CONFIG_PATH_ENV: &str = "RELGATE_CONFIG";
/// Document used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "relgate.json";

const LOG_LEVEL_ENV: &str = "RELGATE_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "RELGATE_LOG_FORMAT";
const KNOWN_KEYED_SOURCES: &[&str] = &["prowlarr"];

/// Load, override and validate the configuration using the process environment.
///
/// A missing default document yields the built-in defaults; a missing document
/// named explicitly through [`CONFIG_PATH_ENV`] is an error.
///
/// # Errors
///
/// Returns an error when the document cannot be read or parsed, or fails validation.
pub fn load() -> ConfigResult<PipelineConfig> {
    let lookup = |key: &str| std::env::var(key).ok();
    let (path, explicit) = match lookup(CONFIG_PATH_ENV) {
        Some(path) if !path.trim().is_empty() => (PathBuf::from(path), true),
        _ => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    let mut config = match read_document(&path) {
        Ok(config) => config,
        Err(ConfigError::Io { source, .. })
            if !explicit && source.kind() == io::ErrorKind::NotFound =>
        {
            warn!(path = %path.display(), "configuration file not found; using defaults");
            PipelineConfig::default()
        }
        Err(err) => return Err(err),
    };
    apply_env_overrides(&mut config, lookup);
    validate(&config)?;
    info!(path = %path.display(), sources = config.sources.len(), "configuration loaded");
    Ok(config)
}

/// Load and validate the document at `path` without environment overrides.
///
/// # Errors
///
/// Returns an error when the document cannot be read or parsed, or fails validation.
pub fn load_from_path(path: &Path) -> ConfigResult<PipelineConfig> {
    let config = read_document(path)?;
    validate(&config)?;
    Ok(config)
}

/// Apply `RELGATE_LOG_LEVEL`, `RELGATE_LOG_FORMAT` and `RELGATE_<SOURCE>_API_KEY`.
///
/// `lookup` resolves environment keys so callers can inject values in tests.
pub fn apply_env_overrides<F>(config: &mut PipelineConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|value| !value.trim().is_empty()) {
        config.logging.level = level;
    }
    if let Some(format) = lookup(LOG_FORMAT_ENV).filter(|value| !value.trim().is_empty()) {
        config.logging.format = Some(format.trim().to_ascii_lowercase());
    }

    let mut names: Vec<String> = config.sources.keys().cloned().collect();
    for known in KNOWN_KEYED_SOURCES {
        if !names.iter().any(|name| name == known) {
            names.push((*known).to_string());
        }
    }
    for name in names {
        let key = format!("RELGATE_{}_API_KEY", name.to_ascii_uppercase());
        if let Some(api_key) = lookup(&key).filter(|value| !value.trim().is_empty()) {
            config.sources.entry(name).or_default().api_key = api_key;
        }
    }
}

fn read_document(path: &Path) -> ConfigResult<PipelineConfig> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.read",
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_logging_and_api_keys() {
        let mut config = PipelineConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("RELGATE_LOG_LEVEL", "debug"),
                ("RELGATE_LOG_FORMAT", "JSON"),
                ("RELGATE_PROWLARR_API_KEY", "secret"),
            ]),
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert_eq!(config.source("prowlarr").api_key, "secret");
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let mut config = PipelineConfig::default();
        apply_env_overrides(&mut config, env(&[("RELGATE_LOG_LEVEL", "  ")]));
        assert_eq!(config.logging.level, "info");
        assert!(config.sources.is_empty());
    }

    #[test]
    fn malformed_document_is_a_json_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("relgate.json");
        fs::write(&path, "{ not json")?;
        assert!(matches!(
            load_from_path(&path),
            Err(ConfigError::Json { .. })
        ));
        Ok(())
    }
}

// Configuration loader
// Loads ~/.quill/config.toml (or an explicit path) and applies env overrides

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Config;

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".quill").join("config.toml"))
}

/// Load configuration.
///
/// An explicit `path` must exist. Without one, `~/.quill/config.toml` is used
/// when present and built-in defaults otherwise. Environment overrides are
/// applied last, then the result is validated.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => match default_config_path() {
            Some(default) if default.exists() => parse_file(&default)?,
            _ => {
                tracing::debug!("No config file found, using defaults");
                Config::default()
            }
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

/// Parse a TOML document into a `Config`
pub fn parse_config_str(contents: &str) -> Result<Config> {
    toml::from_str(contents).context("Failed to parse configuration TOML")
}

fn parse_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = parse_config_str(&contents)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    tracing::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = non_empty("QUILL_OLLAMA_URL") {
        config.llm.base_url = url;
    }
    if let Some(model) = non_empty("QUILL_MODEL") {
        config.llm.default_model = model;
    }
    if let Some(db) = non_empty("QUILL_DB_PATH") {
        config.store.path = PathBuf::from(db);
    }
}

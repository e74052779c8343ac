// Configuration source loading.
//
// Priority order:
// 1. Environment variables (CHUNKPIPE_* prefix)
// 2. Config file path from CHUNKPIPE_CONFIG
// 3. Inline config content from CHUNKPIPE_CONFIG_CONTENT
// 4. Default config file (./chunkpipe.toml)
// 5. Built-in defaults

use super::env_overrides::{self, StdEnvSource};
use super::RuntimeConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_FILES: &[&str] = &["./chunkpipe.toml", "./.chunkpipe.toml"];

/// Load configuration using the process environment and default file locations.
pub fn load_config() -> Result<RuntimeConfig> {
    let mut config = load_from_file()?.unwrap_or_default();
    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

pub(super) fn parse_toml(content: &str, origin: &str) -> Result<RuntimeConfig> {
    toml::from_str(content).with_context(|| format!("Failed to parse {}", origin))
}

fn read_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_toml(&content, &format!("config file: {}", path.display()))
}

fn load_from_file() -> Result<Option<RuntimeConfig>> {
    if let Ok(path) = env::var("CHUNKPIPE_CONFIG") {
        return read_file(Path::new(&path)).map(Some);
    }

    if let Ok(content) = env::var("CHUNKPIPE_CONFIG_CONTENT") {
        return parse_toml(&content, "inline config from CHUNKPIPE_CONFIG_CONTENT").map(Some);
    }

    for path in DEFAULT_CONFIG_FILES {
        let path = Path::new(path);
        if path.exists() {
            return read_file(path).map(Some);
        }
    }

    Ok(None)
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
///
/// Validation is deferred so command-line flags can still fill in missing
/// values; call [`RuntimeConfig::validate`] once they are applied.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let mut config = read_file(path.as_ref())?;
    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    Ok(config)
}

/// Load configuration with graceful fallback to defaults.
/// Tries standard config locations, returns defaults if none found.
/// Like [`load_from_file_path`], leaves validation to the caller.
pub fn load_or_default() -> Result<RuntimeConfig> {
    let mut config = match load_from_file() {
        Ok(Some(file_config)) => file_config,
        Ok(None) => RuntimeConfig::default(),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable config file, using defaults");
            RuntimeConfig::default()
        }
    };

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    Ok(config)
}

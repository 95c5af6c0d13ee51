pub mod schema;

pub use schema::{EngineConfig, RefreshConfig};

use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use std::path::{Path, PathBuf};

/// Default home directory (~/.toolrunner).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".toolrunner"))
        .unwrap_or_else(|| PathBuf::from(".toolrunner"))
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read toolrunner config file")?;
        let config: EngineConfig =
            toml::from_str(&contents).context("Failed to parse toolrunner config (TOML)")?;
        Ok(config)
    } else {
        Ok(EngineConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &EngineConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}

/// Length of generated secrets; a 32-byte key selects AES-256.
pub const SECRET_LEN: usize = 32;

/// A fresh alphanumeric AES-256 key for `init`, drawn from the OS RNG
/// (about 190 bits of entropy).
pub fn generate_secret() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

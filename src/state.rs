use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::store::{SqliteStore, Store};
use crate::types::Config;

/// Configuration plus the store every service call goes through.
pub struct DeskState {
    pub config: Config,
    pub store: Arc<dyn Store>,
}

impl DeskState {
    /// Load config and open the SQLite store it points at.
    pub fn open() -> Result<Self, String> {
        let config = load_config()?;
        let store = open_store(&config)?;
        Ok(Self { config, store })
    }

    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Self {
        Self { config, store }
    }
}

/// Open the SQLite store named by `config`, or the default database.
pub fn open_store(config: &Config) -> Result<Arc<dyn Store>, String> {
    let store = match config.database_path.as_deref() {
        Some(path) if !path.trim().is_empty() => SqliteStore::open_at(path),
        _ => SqliteStore::open(),
    }
    .map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Arc::new(store))
}

/// Get the canonical config file path (~/.clientdesk/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".clientdesk").join("config.json"))
}

/// Load configuration from ~/.clientdesk/config.json
///
/// A missing file is not an error: every setting has a default.
pub fn load_config() -> Result<Config, String> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        log::info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Write `config` to `path`, creating the parent directory.
pub fn save_config_to(path: &Path, config: &Config) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))
}

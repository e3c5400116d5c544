mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, DraftsConfig, FeedConfig};
pub use database::Database;

use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Returns `~/.config/daybook[-dev]/` based on DAYBOOK_ENV.
///
/// Set DAYBOOK_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("DAYBOOK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("daybook-dev")
    } else {
        base_dir.join("daybook")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::LoadFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

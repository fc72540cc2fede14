//! Default locations for kvstate data.
//!
//! - [`get_kvstate_dir`] - `~/.kvstate/` (base directory)
//! - [`get_records_dir`] - `~/.kvstate/records/` (filesystem medium root)
//! - [`get_database_path`] - `~/.kvstate/state.redb` (redb medium file)
//! - [`get_config_path`] - `~/.kvstate/kvstate.toml` (host configuration)

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable overriding the base directory.
pub const HOME_ENV: &str = "KVSTATE_HOME";

/// Get the kvstate base directory.
///
/// Resolution order:
/// 1. `KVSTATE_HOME` environment variable (if set and non-empty)
/// 2. `~/.kvstate/` (default)
pub fn get_kvstate_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV)
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".kvstate"))
}

/// Get the default filesystem medium root: `~/.kvstate/records/`
pub fn get_records_dir() -> Result<PathBuf> {
    Ok(get_kvstate_dir()?.join("records"))
}

/// Get the default redb database path: `~/.kvstate/state.redb`
pub fn get_database_path() -> Result<PathBuf> {
    Ok(get_kvstate_dir()?.join("state.redb"))
}

/// Get the default configuration file path: `~/.kvstate/kvstate.toml`
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_kvstate_dir()?.join("kvstate.toml"))
}

//! Persistence adapter.
//!
//! Timer state and history are stored as two JSON documents under fixed
//! keys. Every backend only needs whole-value `get` and `set`; the store
//! rewrites the full collection on each mutation.

mod config;
pub mod database;
pub mod memory;

pub use config::{Config, ExportConfig, NotificationsConfig, TimerConfig};
pub use database::Database;
pub use memory::MemoryStore;

use std::path::PathBuf;

use crate::error::StorageError;

/// Key holding the JSON array of timers.
pub const TIMERS_KEY: &str = "timers";
/// Key holding the JSON array of completed runs.
pub const HISTORY_KEY: &str = "history";

/// Key-value persistence used by the timer store and history log.
///
/// An absent key is `Ok(None)`, never an error.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Returns the data directory, creating it if needed.
///
/// `TIMERAPP_DATA_DIR` wins when set. Otherwise `~/.config/timerapp[-dev]/`,
/// with `TIMERAPP_ENV=dev` selecting the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let dir = match std::env::var_os("TIMERAPP_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("TIMERAPP_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("timerapp-dev")
            } else {
                base_dir.join("timerapp")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| StorageError::DataDir {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

//! Append-only log of completed runs.
//!
//! Entries are snapshots: deleting or renaming a timer later does not touch
//! its history.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ExportError, Result};
use crate::storage::{KvStore, HISTORY_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub name: String,
    /// Completion instant, serialized as ISO-8601.
    pub time: DateTime<Utc>,
    /// Total duration of the run in seconds.
    pub duration: u64,
}

/// History persisted under the `history` key.
#[derive(Clone)]
pub struct HistoryLog {
    kv: Arc<dyn KvStore>,
}

impl HistoryLog {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// All entries in completion order. Missing or corrupt data reads as empty.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        let raw = match self.kv.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read history");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "history payload is unparseable; treating as empty");
                Vec::new()
            }
        }
    }

    /// Append one entry and rewrite the whole collection.
    ///
    /// Unlike [`HistoryLog::entries`], the stored payload is read strictly: a
    /// read failure or an unparseable payload leaves it untouched.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be read, parsed, serialized or
    /// written.
    pub fn append(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries: Vec<HistoryEntry> = match self.kv.get(HISTORY_KEY)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        info!(name = %entry.name, duration = entry.duration, "recording completed run");
        entries.push(entry);
        let json = serde_json::to_string(&entries)?;
        self.kv.set(HISTORY_KEY, &json)?;
        Ok(())
    }

    /// Write the stored history payload verbatim to `path`.
    ///
    /// # Errors
    /// `ExportError::NoHistory` if nothing was ever recorded, or
    /// `ExportError::WriteFailed` if the file cannot be written.
    pub fn export_to(&self, path: &Path) -> Result<PathBuf> {
        let data = self.kv.get(HISTORY_KEY)?.ok_or(ExportError::NoHistory)?;
        std::fs::write(path, data).map_err(|source| ExportError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "exported history");
        Ok(path.to_path_buf())
    }
}

//! Execution history: one entry per submit or run, most recent first.

use crate::error::{Error, Result};
use crate::fs::write_atomic;
use crate::types::JobName;
use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info};

/// Immutable record of one submit or run: what the job printed and what went wrong.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "filename")]
    pub job_name: String,
    #[serde(rename = "time", with = "timestamp")]
    pub timestamp: NaiveDateTime,
    pub output: String,
    pub error: String,
}

impl HistoryEntry {
    /// A new entry stamped with the current local time, to the second.
    pub fn now(job_name: &JobName, output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_name: job_name.to_string(),
            timestamp: current_second(),
            output: output.into(),
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

fn current_second() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// `YYYY-MM-DD HH:MM:SS`, the format history files have always used.
mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&text, FORMAT).map_err(de::Error::custom)
    }
}

/// The history sequence, persisted in full after every change.
///
/// The lock is held across each mutation and its write, so concurrent callers can't
/// lose each other's updates and the file always matches some in-memory state.
#[derive(Debug)]
pub struct HistoryStore {
    path: Option<PathBuf>,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl HistoryStore {
    /// Rehydrate the history kept at `path`. A missing file is an empty history.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::io(&path, e)),
        };
        debug!(path = %path.display(), entries = entries.len(), "loaded history");
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// A history that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of every entry, most recent first.
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn prepend(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(0, entry);
        self.write(&entries).await
    }

    /// Restamp `entry` with the current time and prepend it, unless `keep` returns false once
    /// the lock is held. Stamping under the lock keeps timestamps in list order.
    ///
    /// Returns the entry as recorded, or `None` if it was discarded.
    pub async fn prepend_if(
        &self,
        mut entry: HistoryEntry,
        keep: impl FnOnce() -> bool,
    ) -> Result<Option<HistoryEntry>> {
        let mut entries = self.entries.lock().await;
        if !keep() {
            return Ok(None);
        }
        entry.timestamp = current_second();
        entries.insert(0, entry.clone());
        self.write(&entries).await?;
        Ok(Some(entry))
    }

    /// Drop every entry of `job_name`. Returns how many were removed.
    pub async fn remove_all(&self, job_name: &JobName) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|entry| entry.job_name != job_name.as_str());
        let removed = before - entries.len();
        if removed > 0 {
            self.write(&entries).await?;
            info!(job = %job_name, removed, "purged history");
        }
        Ok(removed)
    }

    /// Rewrite the history file from the in-memory sequence.
    pub async fn persist(&self) -> Result<()> {
        let entries = self.entries.lock().await;
        self.write(&entries).await
    }

    async fn write(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(path) = &self.path {
            let json = serde_json::to_vec_pretty(entries)?;
            write_atomic(path, &json).await?;
        }
        Ok(())
    }
}

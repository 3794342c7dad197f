//! Connection history sink
//!
//! The core records nothing itself; it notifies a [`HistorySink`] each time
//! an interactive session starts and leaves persistence to the caller.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One successful interactive session start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub hostname: String,
    pub username: String,
    pub protocol: String,
}

impl HistoryEntry {
    pub fn ssh(hostname: &str, username: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            username: username.to_string(),
            protocol: "ssh".to_string(),
        }
    }
}

pub trait HistorySink: Send + Sync {
    fn record(&self, entry: &HistoryEntry);
}

/// Discards every entry
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHistory;

impl HistorySink for NoopHistory {
    fn record(&self, _entry: &HistoryEntry) {}
}

/// Keeps entries in memory, oldest first
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().clone()
    }
}

impl HistorySink for MemoryHistory {
    fn record(&self, entry: &HistoryEntry) {
        self.entries.lock().push(entry.clone());
    }
}

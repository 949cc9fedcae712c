use std::{
    collections::VecDeque,
    fmt::{Display, Formatter},
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_ENTRIES: usize = 500;
const DEFAULT_LIST_LIMIT: usize = 100;
const DEFAULT_PER_PAGE: usize = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Maps free-form level names onto the three known levels; anything
    /// unrecognised is `Info`.
    pub fn normalize(level: &str) -> Self {
        match level.trim().to_ascii_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warning" | "warn" => LogLevel::Warning,
            _ => LogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub level: LogLevel,
    pub event: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<Uuid>,
}

impl ActivityEntry {
    pub fn new(
        source: impl Into<String>,
        level: LogLevel,
        event: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            source: source.into(),
            level,
            event: event.into(),
            message: message.into(),
            stream_id: None,
        }
    }

    pub fn with_stream(mut self, stream_id: Uuid) -> Self {
        self.stream_id = Some(stream_id);
        self
    }
}

/// Write-only, fire-and-forget acceptor of activity entries.
pub trait ActivitySink: Send + Sync {
    fn record(&self, entry: ActivityEntry);
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// Bounded in-memory activity log; the oldest entries fall off first.
pub struct ActivityStore {
    entries: RwLock<VecDeque<ActivityEntry>>,
    capacity: usize,
}

impl Default for ActivityStore {
    fn default() -> Self {
        Self::with_capacity(MAX_ENTRIES)
    }
}

impl ActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Newest first. `0` means the default of 100.
    pub fn list(&self, limit: usize) -> Vec<ActivityEntry> {
        let limit = match limit {
            0 => DEFAULT_LIST_LIMIT,
            n => n.min(self.capacity),
        };
        self.entries.read().iter().rev().take(limit).cloned().collect()
    }

    /// Newest first, 1-based pages. Out-of-range pages are clamped.
    pub fn page(&self, page: usize, per_page: usize) -> Page<ActivityEntry> {
        let per_page = match per_page {
            0 => DEFAULT_PER_PAGE,
            n => n.min(self.capacity),
        };
        let entries = self.entries.read();
        let total = entries.len();
        let total_pages = total.div_ceil(per_page);
        let page = page.clamp(1, total_pages.max(1));

        let items = entries
            .iter()
            .rev()
            .skip((page - 1) * per_page)
            .take(per_page)
            .cloned()
            .collect();

        Page {
            items,
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

impl ActivitySink for ActivityStore {
    fn record(&self, entry: ActivityEntry) {
        let mut entries = self.entries.write();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

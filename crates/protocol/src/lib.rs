//! Shared types for inline-blame.
//!
//! The attribution model (`FileId`, `AttributionRecord`, `Attribution`) is what
//! crosses the resolver boundary. The session types describe the JSON-lines
//! protocol spoken between an editor plugin and the `inline-blame session`
//! process.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Placeholder used when a line of annotate output can't be attributed.
pub const UNKNOWN: &str = "unknown";

/// Stable key for a file across calls, normally its absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Author and revision that last touched one source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionRecord {
    line_number: usize,
    author: String,
    revision_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<String>,
}

impl AttributionRecord {
    pub fn new(
        line_number: usize,
        author: impl Into<String>,
        revision_id: impl Into<String>,
        date: Option<String>,
    ) -> Self {
        Self {
            line_number,
            author: author.into(),
            revision_id: revision_id.into(),
            date,
        }
    }

    /// Record for a line whose annotate output didn't carry both tokens.
    pub fn unknown(line_number: usize) -> Self {
        Self::new(line_number, UNKNOWN, UNKNOWN, None)
    }

    /// 1-based source line this record belongs to.
    pub const fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn revision_id(&self) -> &str {
        &self.revision_id
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn is_unknown(&self) -> bool {
        self.author == UNKNOWN && self.revision_id == UNKNOWN
    }
}

/// Result of a line lookup: a record, or nothing to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    Record(AttributionRecord),
    Unavailable,
}

impl Attribution {
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Record(_))
    }

    pub const fn record(&self) -> Option<&AttributionRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::Unavailable => None,
        }
    }

    pub fn into_record(self) -> Option<AttributionRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::Unavailable => None,
        }
    }
}

impl From<Option<AttributionRecord>> for Attribution {
    fn from(value: Option<AttributionRecord>) -> Self {
        value.map_or(Self::Unavailable, Self::Record)
    }
}

/// Editor → session events, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Cursor moved in the active editor.
    Cursor { file: String, line: i64 },
    /// Document content changed.
    Edit {
        file: String,
        #[serde(default)]
        line: Option<i64>,
    },
    /// Document saved.
    Save {
        file: String,
        #[serde(default)]
        line: Option<i64>,
    },
    /// Document closed.
    Close { file: String },
    /// Show attribution for the active line now.
    Show,
    /// Re-annotate the active file and show the active line.
    Refresh,
    /// Drop every cached table.
    Clear,
    /// Report resolver counters.
    Stats,
}

/// Session → editor replies, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum SessionReply {
    Attribution {
        file: String,
        line: usize,
        author: String,
        revision: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<String>,
        text: String,
    },
    Unavailable {
        file: String,
        line: i64,
    },
    Notice {
        message: String,
    },
    Stats {
        hits: u64,
        misses: u64,
        spawns: u64,
        failures: u64,
        busy_dropped: u64,
        queued: u64,
        stale_discarded: u64,
        invalidations: u64,
        cached_files: usize,
        refreshing_files: usize,
        /// Concurrent annotate process cap.
        spawn_limit: usize,
        spawns_in_flight: usize,
        spawn_waiters: usize,
    },
    Error {
        message: String,
    },
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

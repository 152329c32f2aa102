//! Storage module for persisting scan results
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Scan tracking (started, completed, aborted, failed)
//! - The page dataset and archived frontier
//! - Issues and their occurrences

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::aggregate::SeverityCounts;

/// Represents a scan in the database
#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub seed_url: String,
    pub scan_type: String,
    pub strategy: Option<String>,
    pub status: RunStatus,
    pub abort_reason: Option<String>,
    pub error_message: Option<String>,
    pub config_hash: String,
    pub duplicates: u64,
    pub counts: SeverityCounts,
}

/// Archived URL counts for one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlCounts {
    pub scanned: u64,
    pub failed: u64,
    pub excluded: u64,
    /// Never dispatched (budget or abort)
    pub queued: u64,
    pub invalid: u64,
}

impl UrlCounts {
    pub fn total(&self) -> u64 {
        self.scanned + self.failed + self.excluded + self.queued + self.invalid
    }
}

/// Status of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Aborted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

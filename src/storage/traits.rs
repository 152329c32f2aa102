//! Storage traits and error types

use crate::aggregate::{AggregatedIssue, SeverityCounts};
use crate::config::ScanType;
use crate::state::{PageRecord, ScanReport};
use crate::storage::{ScanRecord, UrlCounts};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Scan not found: {0}")]
    ScanNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
pub trait Storage {
    // ===== Scan Management =====

    /// Records the start of a scan and returns its id
    fn create_scan(
        &mut self,
        seed_url: &str,
        scan_type: ScanType,
        config_hash: &str,
    ) -> StorageResult<i64>;

    fn get_scan(&self, scan_id: i64) -> StorageResult<ScanRecord>;

    fn get_latest_scan(&self) -> StorageResult<Option<ScanRecord>>;

    /// Marks a scan as failed before a report could be produced
    fn fail_scan(&mut self, scan_id: i64, message: &str) -> StorageResult<()>;

    /// Persists a finished (or aborted) scan in one transaction
    ///
    /// Writes the page dataset, the archived frontier, every issue with its
    /// occurrences, and the final severity counts.
    fn save_report(&mut self, scan_id: i64, report: &ScanReport) -> StorageResult<()>;

    // ===== Pages =====

    /// Page dataset in scan order
    fn load_pages(&self, scan_id: i64) -> StorageResult<Vec<PageRecord>>;

    /// Archived URLs grouped by final state
    fn count_urls(&self, scan_id: i64) -> StorageResult<UrlCounts>;

    // ===== Issues =====

    /// Issues with occurrences, most severe first
    fn load_issues(&self, scan_id: i64) -> StorageResult<Vec<AggregatedIssue>>;

    /// Severity counts recomputed from stored occurrences
    fn severity_counts(&self, scan_id: i64) -> StorageResult<SeverityCounts>;

    /// Pages with the most issue occurrences, highest first
    fn top_pages(&self, scan_id: i64, limit: usize) -> StorageResult<Vec<(String, u64)>>;
}

//! Output handler traits and types
//!
//! This module defines the trait interface for output handlers and
//! the summary shape shared by every report format.

use crate::aggregate::{top_pages, AggregatedIssue, SeverityCounts};
use crate::state::{ScanReport, UrlWithReason};
use crate::storage::{RunStatus, StorageError};
use thiserror::Error;

/// Number of pages listed in the "most issues" table
pub const TOP_PAGES: usize = 5;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Summary of one scan, built from a live report or from storage
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    // Scan metadata
    pub scan_id: Option<i64>,
    pub seed_url: String,
    pub scan_type: String,
    pub strategy: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub status: String,
    pub abort_reason: Option<String>,

    // Page outcomes
    pub pages_scanned: u64,
    pub pages_failed: u64,
    pub pages_excluded: u64,
    pub urls_invalid: u64,
    pub duplicates: u64,

    // Findings
    pub counts: SeverityCounts,
    pub issues: Vec<AggregatedIssue>,
    pub top_pages: Vec<(String, u64)>,
    pub failures: Vec<UrlWithReason>,
}

impl ScanSummary {
    /// Summarizes a finished report
    pub fn from_report(report: &ScanReport) -> Self {
        let crawled = &report.urls_crawled;
        let status = if report.is_aborted() {
            RunStatus::Aborted
        } else {
            RunStatus::Completed
        };

        Self {
            scan_id: None,
            seed_url: report.seed_url.clone(),
            scan_type: report.scan_type.to_string(),
            strategy: report.strategy.to_string(),
            started_at: report.start_time.to_rfc3339(),
            finished_at: Some(report.end_time.to_rfc3339()),
            duration_seconds: Some(report.duration().num_seconds().max(0) as u64),
            status: status.to_db_string().to_string(),
            abort_reason: report.abort.map(|reason| reason.to_string()),
            pages_scanned: crawled.scanned.len() as u64,
            pages_failed: crawled.failed.len() as u64,
            pages_excluded: crawled.excluded.len() as u64,
            urls_invalid: crawled.invalid.len() as u64,
            duplicates: report.duplicates,
            counts: report.severity_counts,
            issues: report.issues.clone(),
            top_pages: top_pages(&report.issues, TOP_PAGES),
            failures: crawled.failed.clone(),
        }
    }

    /// Pages that reached a terminal state
    pub fn total_terminal_pages(&self) -> u64 {
        self.pages_scanned + self.pages_failed + self.pages_excluded
    }

    /// Percentage of visited pages that were scanned
    pub fn success_rate(&self) -> f64 {
        let visited = self.pages_scanned + self.pages_failed;
        if visited == 0 {
            return 0.0;
        }
        (self.pages_scanned as f64 / visited as f64) * 100.0
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }
}

/// A destination for a finished scan report
pub trait OutputHandler {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    fn write_report(&self, report: &ScanReport) -> OutputResult<()>;
}

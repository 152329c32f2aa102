//! Output module for scan summaries and reports
//!
//! This module handles:
//! - Markdown summaries of scan results
//! - The JSON report of a finished scan
//! - Statistics printed from the scan database

mod json;
mod markdown;
pub mod stats;
mod traits;

pub use json::{read_json_report, write_json_report, JsonReportWriter};
pub use markdown::{format_markdown_summary, generate_markdown_summary, MarkdownSummaryWriter};
pub use stats::{load_statistics, print_statistics, ScanStatistics};
pub use traits::{OutputError, OutputHandler, OutputResult, ScanSummary, TOP_PAGES};

use crate::config::StorageConfig;
use crate::state::{ScanReport, UrlState, UrlWithReason};
use crate::storage::Storage;
use crate::ScanError;

/// Writes every configured output for a finished scan
pub fn write_outputs(report: &ScanReport, config: &StorageConfig) -> OutputResult<()> {
    let handlers: [Box<dyn OutputHandler>; 2] = [
        Box::new(MarkdownSummaryWriter::new(&config.summary_path)),
        Box::new(JsonReportWriter::new(&config.report_path)),
    ];

    for handler in &handlers {
        handler.write_report(report)?;
        tracing::debug!("Wrote {}", handler.name());
    }

    tracing::info!(
        "Summary written to {}, report to {}",
        config.summary_path.display(),
        config.report_path.display()
    );
    Ok(())
}

/// Rebuilds a scan summary from storage
///
/// Uses the latest scan when `scan_id` is None.
pub fn generate_summary(
    storage: &dyn Storage,
    scan_id: Option<i64>,
) -> Result<ScanSummary, ScanError> {
    let stats = load_statistics(storage, scan_id)?;
    let scan = &stats.scan;

    let duration_seconds = match (
        scan.started_at.parse::<chrono::DateTime<chrono::Utc>>(),
        scan.finished_at
            .as_deref()
            .map(str::parse::<chrono::DateTime<chrono::Utc>>),
    ) {
        (Ok(started), Some(Ok(finished))) => Some((finished - started).num_seconds().max(0) as u64),
        _ => None,
    };

    let failures = storage
        .load_pages(scan.id)?
        .into_iter()
        .filter(|page| page.outcome == UrlState::Failed)
        .map(|page| UrlWithReason {
            url: page.url,
            reason: page.error.unwrap_or_default(),
        })
        .collect();

    let issues = storage.load_issues(scan.id)?;

    Ok(ScanSummary {
        scan_id: Some(scan.id),
        seed_url: scan.seed_url.clone(),
        scan_type: scan.scan_type.clone(),
        strategy: scan.strategy.clone().unwrap_or_default(),
        started_at: scan.started_at.clone(),
        finished_at: scan.finished_at.clone(),
        duration_seconds,
        status: scan.status.to_db_string().to_string(),
        abort_reason: scan.abort_reason.clone(),
        pages_scanned: stats.urls.scanned,
        pages_failed: stats.urls.failed,
        pages_excluded: stats.urls.excluded,
        urls_invalid: stats.urls.invalid,
        duplicates: scan.duplicates,
        counts: stats.counts,
        issues,
        top_pages: stats.top_pages.clone(),
        failures,
    })
}

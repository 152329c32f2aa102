//! Statistics generation from the scan database
//!
//! This module provides functionality for extracting and displaying
//! scan statistics from the storage layer.

use crate::aggregate::{Severity, SeverityCounts};
use crate::output::traits::TOP_PAGES;
use crate::storage::{ScanRecord, Storage, StorageError, UrlCounts};
use crate::ScanError;

/// Statistics for one stored scan
#[derive(Debug, Clone)]
pub struct ScanStatistics {
    pub scan: ScanRecord,

    /// Archived URLs by final state
    pub urls: UrlCounts,

    /// Occurrences recomputed from stored issues
    pub counts: SeverityCounts,

    /// Number of distinct issues
    pub issue_count: u64,

    /// Pages with the most issue occurrences
    pub top_pages: Vec<(String, u64)>,
}

/// Loads statistics for a scan, or the latest scan when `scan_id` is None
pub fn load_statistics(
    storage: &dyn Storage,
    scan_id: Option<i64>,
) -> Result<ScanStatistics, ScanError> {
    let scan = match scan_id {
        Some(id) => storage.get_scan(id)?,
        None => storage
            .get_latest_scan()?
            .ok_or_else(|| StorageError::Database("No scans found in database".to_string()))?,
    };

    let urls = storage.count_urls(scan.id)?;
    let counts = storage.severity_counts(scan.id)?;
    let issue_count = storage.load_issues(scan.id)?.len() as u64;
    let top_pages = storage.top_pages(scan.id, TOP_PAGES)?;

    Ok(ScanStatistics {
        scan,
        urls,
        counts,
        issue_count,
        top_pages,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &ScanStatistics) {
    let scan = &stats.scan;
    println!("=== Scan Statistics ===\n");

    println!("Scan {}:", scan.id);
    println!("  Target: {}", scan.seed_url);
    println!("  Type: {}", scan.scan_type);
    if let Some(strategy) = &scan.strategy {
        println!("  Strategy: {}", strategy);
    }
    println!("  Status: {}", scan.status.to_db_string());
    println!("  Started: {}", scan.started_at);
    if let Some(finished) = &scan.finished_at {
        println!("  Finished: {}", finished);
    }
    if let Some(reason) = &scan.abort_reason {
        println!("  Aborted: {}", reason);
    }
    if let Some(message) = &scan.error_message {
        println!("  Error: {}", message);
    }
    println!();

    let urls = &stats.urls;
    let total = urls.total();
    println!("URLs by State:");
    for (label, count) in [
        ("Scanned", urls.scanned),
        ("Failed", urls.failed),
        ("Excluded", urls.excluded),
        ("Never visited", urls.queued),
        ("Invalid", urls.invalid),
    ] {
        if count > 0 {
            println!("  {}: {} ({:.1}%)", label, count, percentage(count, total));
        }
    }
    println!("  Duplicate links: {}", scan.duplicates);
    println!();

    println!("Issues ({} unique):", stats.issue_count);
    for severity in Severity::ALL {
        println!("  {}: {}", severity, stats.counts.get(severity));
    }
    println!(
        "  mustFix: {}, goodToFix: {}",
        stats.counts.must_fix(),
        stats.counts.good_to_fix()
    );
    println!();

    if !stats.top_pages.is_empty() {
        println!("Pages with the most issues:");
        for (url, count) in &stats.top_pages {
            println!("  {} ({})", url, count);
        }
        println!();
    }

    let visited = urls.scanned + urls.failed;
    println!(
        "Success Rate: {:.1}% ({} / {} pages scanned)",
        percentage(urls.scanned, visited),
        urls.scanned,
        visited
    );
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64) * 100.0
}

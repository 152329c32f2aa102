//! Scan session: the aggregate root shared by every crawl phase

use crate::aggregate::{
    AbortReason, AggregatedIssue, MergeOutcome, PageVisitResult, ResultAggregator,
    SeverityCounts, ThresholdMonitor, ThresholdStatus,
};
use crate::config::{ScanType, ThresholdConfig};
use crate::frontier::UrlRecord;
use crate::state::{DiscoverySource, UrlState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Which crawl phases actually ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyUsed {
    Sitemap,
    Domain,
    SitemapThenDomain,
    LocalFile,
}

impl StrategyUsed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sitemap => "sitemap",
            Self::Domain => "domain",
            Self::SitemapThenDomain => "sitemap-then-domain",
            Self::LocalFile => "local-file",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "sitemap" => Some(Self::Sitemap),
            "domain" => Some(Self::Domain),
            "sitemap-then-domain" => Some(Self::SitemapThenDomain),
            "local-file" => Some(Self::LocalFile),
            _ => None,
        }
    }

    /// Records that the domain phase ran after this one
    pub fn then_domain(self) -> Self {
        match self {
            Self::Sitemap | Self::SitemapThenDomain => Self::SitemapThenDomain,
            other => other,
        }
    }
}

impl fmt::Display for StrategyUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A URL that reached a terminal state other than Scanned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlWithReason {
    pub url: String,
    pub reason: String,
}

/// Terminal URLs partitioned by outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlsCrawled {
    pub scanned: Vec<String>,
    pub failed: Vec<UrlWithReason>,
    pub excluded: Vec<UrlWithReason>,
    /// Raw URLs that could not be canonicalized and were never admitted
    pub invalid: Vec<String>,
}

impl UrlsCrawled {
    /// Partitions archived frontier records by terminal state
    ///
    /// Records that never left Queued (budget or abort) are not terminal and
    /// are left out.
    pub fn from_records(records: &[UrlRecord], invalid: Vec<String>) -> Self {
        let mut crawled = Self {
            invalid,
            ..Default::default()
        };

        for record in records {
            let reason = || record.detail.clone().unwrap_or_default();
            match record.state {
                UrlState::Scanned => crawled.scanned.push(record.canonical_url.clone()),
                UrlState::Failed => crawled.failed.push(UrlWithReason {
                    url: record.canonical_url.clone(),
                    reason: reason(),
                }),
                UrlState::Excluded => crawled.excluded.push(UrlWithReason {
                    url: record.canonical_url.clone(),
                    reason: reason(),
                }),
                UrlState::Queued | UrlState::InProgress => {}
            }
        }

        crawled
    }
}

/// One row of the page dataset, in scan order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub order: u64,
    pub url: String,
    pub final_url: Option<String>,
    pub outcome: UrlState,
    pub source: DiscoverySource,
    pub attempts: u32,
    pub http_status: Option<u16>,
    pub error: Option<String>,
    pub finding_count: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Live state of one scan
///
/// Owns the aggregator and threshold monitor; workers from every phase
/// merge into the same session.
#[derive(Debug)]
pub struct ScanSession {
    seed_url: String,
    scan_type: ScanType,
    started_at: DateTime<Utc>,
    aggregator: ResultAggregator,
    monitor: ThresholdMonitor,
    pages: Mutex<Vec<PageRecord>>,
    strategy: Mutex<Option<StrategyUsed>>,
}

impl ScanSession {
    pub fn new(seed_url: impl Into<String>, scan_type: ScanType, limits: ThresholdConfig) -> Self {
        Self {
            seed_url: seed_url.into(),
            scan_type,
            started_at: Utc::now(),
            aggregator: ResultAggregator::new(),
            monitor: ThresholdMonitor::new(limits),
            pages: Mutex::new(Vec::new()),
            strategy: Mutex::new(None),
        }
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    /// Merges one page and consults the threshold monitor
    ///
    /// The check runs under the aggregator lock, so a triggered reason
    /// carries the count of the merge that crossed the limit.
    pub fn merge_page(&self, result: &PageVisitResult) -> (MergeOutcome, ThresholdStatus) {
        self.aggregator
            .merge_then(result, |counts| self.monitor.check(counts))
    }

    pub fn is_aborted(&self) -> bool {
        self.monitor.is_aborted()
    }

    pub fn set_strategy(&self, strategy: StrategyUsed) {
        *lock(&self.strategy) = Some(strategy);
    }

    pub fn strategy(&self) -> Option<StrategyUsed> {
        *lock(&self.strategy)
    }

    /// Appends a page to the dataset, assigning its scan order
    #[allow(clippy::too_many_arguments)]
    pub fn record_page(
        &self,
        record: &UrlRecord,
        outcome: UrlState,
        final_url: Option<String>,
        http_status: Option<u16>,
        error: Option<String>,
        finding_count: u64,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> u64 {
        let mut pages = lock(&self.pages);
        let order = pages.len() as u64;
        pages.push(PageRecord {
            order,
            url: record.canonical_url.clone(),
            final_url,
            outcome,
            source: record.discovered_from,
            attempts: record.attempts,
            http_status,
            error,
            finding_count,
            started_at,
            finished_at,
        });
        order
    }

    /// Freezes the session into a serializable report
    pub fn finish(
        &self,
        records: Vec<UrlRecord>,
        invalid: Vec<String>,
        duplicates: u64,
    ) -> ScanReport {
        let urls_crawled = UrlsCrawled::from_records(&records, invalid);
        ScanReport {
            seed_url: self.seed_url.clone(),
            scan_type: self.scan_type,
            strategy: self.strategy().unwrap_or(StrategyUsed::Domain),
            start_time: self.started_at,
            end_time: Utc::now(),
            urls_crawled,
            issues: self.aggregator.issues(),
            severity_counts: self.aggregator.counts(),
            abort: self.monitor.abort_reason(),
            duplicates,
            ignored_findings: self.aggregator.ignored_count(),
            records,
            pages: lock(&self.pages).clone(),
        }
    }
}

/// Finished scan, as persisted and serialized to the JSON report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub seed_url: String,
    pub scan_type: ScanType,
    pub strategy: StrategyUsed,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub urls_crawled: UrlsCrawled,
    /// Most severe first
    pub issues: Vec<AggregatedIssue>,
    pub severity_counts: SeverityCounts,
    pub abort: Option<AbortReason>,
    pub duplicates: u64,
    pub ignored_findings: u64,
    pub records: Vec<UrlRecord>,
    pub pages: Vec<PageRecord>,
}

impl ScanReport {
    pub fn scanned_count(&self) -> usize {
        self.urls_crawled.scanned.len()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_some()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

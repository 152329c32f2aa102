//! URL frontier: canonicalization, deduplication and dispatch
//!
//! The frontier is the only owner of [`UrlRecord`]s. Workers pull work with
//! [`UrlFrontier::next`] and report back with [`UrlFrontier::mark_result`];
//! both are safe to call from many tasks at once.

mod record;

pub use record::{AdmitResult, RejectReason, UrlRecord, VisitOutcome};

use crate::crawler::PoliteFilter;
use crate::state::{DiscoverySource, UrlState};
use crate::url::canonicalize_url;
use crate::ScanError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct FrontierInner {
    records: HashMap<String, UrlRecord>,
    queue: VecDeque<String>,
    /// Raw URLs that could not be canonicalized
    invalid: Vec<String>,
    in_flight: usize,
    scanned: usize,
    next_order: u64,
    halted: bool,
}

enum Dispatch {
    Ready(UrlRecord),
    Wait,
    Done,
}

impl FrontierInner {
    fn try_dispatch(&mut self, max_pages: usize) -> Dispatch {
        if self.halted {
            return Dispatch::Done;
        }

        // Budget counts pages in flight so scanned can never overshoot
        if self.scanned + self.in_flight >= max_pages {
            return if self.in_flight == 0 {
                Dispatch::Done
            } else {
                Dispatch::Wait
            };
        }

        while let Some(url) = self.queue.pop_front() {
            if let Some(record) = self.records.get_mut(&url) {
                if record.state == UrlState::Queued {
                    record.state = UrlState::InProgress;
                    self.in_flight += 1;
                    return Dispatch::Ready(record.clone());
                }
            }
        }

        if self.in_flight == 0 {
            Dispatch::Done
        } else {
            Dispatch::Wait
        }
    }
}

/// Shared queue of URLs to visit, bounded by the page budget
#[derive(Debug)]
pub struct UrlFrontier {
    inner: Mutex<FrontierInner>,
    notify: Notify,
    filter: Arc<PoliteFilter>,
    max_pages: usize,
    duplicates: AtomicU64,
}

impl UrlFrontier {
    pub fn new(filter: Arc<PoliteFilter>, max_pages: usize) -> Self {
        Self {
            inner: Mutex::new(FrontierInner::default()),
            notify: Notify::new(),
            filter,
            max_pages,
            duplicates: AtomicU64::new(0),
        }
    }

    pub fn filter(&self) -> &PoliteFilter {
        &self.filter
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Offers a raw URL to the frontier
    ///
    /// Duplicates are counted, never errors. URLs rejected by the politeness
    /// filter are recorded as `Excluded` so they are not offered again.
    pub fn admit(&self, raw_url: &str, source: DiscoverySource) -> AdmitResult {
        let url = match canonicalize_url(raw_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Invalid URL {}: {}", raw_url, e);
                let mut inner = self.lock();
                if !inner.invalid.iter().any(|u| u == raw_url) {
                    inner.invalid.push(raw_url.to_string());
                }
                return AdmitResult::Rejected(RejectReason::Invalid(e.to_string()));
            }
        };

        let canonical = url.to_string();
        let rejection = self.filter.evaluate(&url);

        let mut inner = self.lock();
        if inner.records.contains_key(&canonical) {
            drop(inner);
            self.duplicates.fetch_add(1, Ordering::Relaxed);
            return AdmitResult::Duplicate;
        }

        let order = inner.next_order;
        inner.next_order += 1;

        let (state, detail) = match &rejection {
            Some(reason) => (UrlState::Excluded, Some(reason.to_string())),
            None => (UrlState::Queued, None),
        };

        inner.records.insert(
            canonical.clone(),
            UrlRecord {
                canonical_url: canonical.clone(),
                state,
                discovered_from: source,
                attempts: 0,
                discovered_order: order,
                detail,
                http_status: None,
            },
        );

        match rejection {
            Some(reason) => {
                tracing::debug!("Excluded {}: {}", canonical, reason);
                AdmitResult::Rejected(reason)
            }
            None => {
                inner.queue.push_back(canonical.clone());
                drop(inner);
                self.notify.notify_waiters();
                AdmitResult::Admitted(canonical)
            }
        }
    }

    /// Hands out the next queued URL, waiting while other workers may still add work
    ///
    /// Returns `None` once the frontier is halted, the page budget is used up
    /// with nothing in flight, or the queue is empty with nothing in flight.
    pub async fn next(&self) -> Option<UrlRecord> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a wake-up between check and await is not lost
            notified.as_mut().enable();

            match self.lock().try_dispatch(self.max_pages) {
                Dispatch::Ready(record) => return Some(record),
                Dispatch::Done => return None,
                Dispatch::Wait => {}
            }

            notified.await;
        }
    }

    /// Counts one navigation attempt for an in-progress URL
    pub fn record_attempt(&self, url: &str) -> u32 {
        let mut inner = self.lock();
        match inner.records.get_mut(url) {
            Some(record) => {
                record.attempts += 1;
                record.attempts
            }
            None => 0,
        }
    }

    /// Records the final outcome of a dispatched URL
    pub fn mark_result(&self, url: &str, outcome: VisitOutcome) -> Result<(), ScanError> {
        let mut inner = self.lock();
        let target = outcome.target_state();

        let record = inner
            .records
            .get_mut(url)
            .ok_or_else(|| ScanError::UnknownUrl(url.to_string()))?;

        if !record.state.can_transition_to(target) {
            return Err(ScanError::InvalidTransition {
                url: url.to_string(),
                from: record.state,
                to: target,
            });
        }

        record.state = target;
        match outcome {
            VisitOutcome::Scanned { http_status } => {
                record.http_status = http_status;
            }
            VisitOutcome::Failed {
                reason,
                http_status,
            } => {
                record.http_status = http_status;
                record.detail = Some(reason);
            }
            VisitOutcome::Excluded { reason } => {
                record.detail = Some(reason);
            }
        }

        inner.in_flight = inner.in_flight.saturating_sub(1);
        if target == UrlState::Scanned {
            inner.scanned += 1;
        }
        drop(inner);

        self.notify.notify_waiters();
        Ok(())
    }

    /// Stops all further dispatch and wakes every waiting worker
    pub fn halt(&self) {
        self.lock().halted = true;
        self.notify.notify_waiters();
    }

    pub fn is_halted(&self) -> bool {
        self.lock().halted
    }

    pub fn scanned_count(&self) -> usize {
        self.lock().scanned
    }

    pub fn queued_count(&self) -> usize {
        self.lock()
            .records
            .values()
            .filter(|r| r.state == UrlState::Queued)
            .count()
    }

    /// True once the page budget has been met
    pub fn budget_exhausted(&self) -> bool {
        self.scanned_count() >= self.max_pages
    }

    /// Number of duplicate admissions observed
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state_of(&self, url: &str) -> Option<UrlState> {
        let canonical = canonicalize_url(url).ok()?;
        self.lock()
            .records
            .get(canonical.as_str())
            .map(|r| r.state)
    }

    /// Raw URLs that failed canonicalization
    pub fn invalid_urls(&self) -> Vec<String> {
        self.lock().invalid.clone()
    }

    /// Copies every record out in discovery order
    pub fn archive(&self) -> Vec<UrlRecord> {
        let mut records: Vec<UrlRecord> = self.lock().records.values().cloned().collect();
        records.sort_by_key(|r| r.discovered_order);
        records
    }

    fn lock(&self) -> MutexGuard<'_, FrontierInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::BlacklistPatterns;
    use std::time::Duration;

    fn frontier(max_pages: usize) -> UrlFrontier {
        UrlFrontier::new(Arc::new(PoliteFilter::permissive()), max_pages)
    }

    fn scanned() -> VisitOutcome {
        VisitOutcome::Scanned {
            http_status: Some(200),
        }
    }

    #[test]
    fn test_equivalent_urls_share_one_record() {
        let f = frontier(10);
        assert!(f.admit("https://x.com/a", DiscoverySource::Seed).is_admitted());
        assert_eq!(
            f.admit("https://x.com/a/", DiscoverySource::Domain),
            AdmitResult::Duplicate
        );
        assert_eq!(
            f.admit("https://X.com/a#frag", DiscoverySource::Sitemap),
            AdmitResult::Duplicate
        );
        assert_eq!(f.len(), 1);
        assert_eq!(f.duplicates(), 2);
    }

    #[test]
    fn test_query_distinguishes_urls() {
        let f = frontier(10);
        assert!(f.admit("https://x.com/list?page=1", DiscoverySource::Seed).is_admitted());
        assert!(f.admit("https://x.com/list?page=2", DiscoverySource::Seed).is_admitted());
        assert_eq!(f.len(), 2);
    }

    #[test]
    fn test_invalid_url_rejected_and_tracked() {
        let f = frontier(10);
        let result = f.admit("not a url", DiscoverySource::Domain);
        assert!(matches!(
            result,
            AdmitResult::Rejected(RejectReason::Invalid(_))
        ));
        assert_eq!(f.invalid_urls(), vec!["not a url".to_string()]);
        assert!(f.is_empty());
    }

    #[test]
    fn test_filtered_url_recorded_as_excluded() {
        let filter = PoliteFilter::new(
            BlacklistPatterns::compile(&["logout".to_string()]).unwrap(),
            vec!["png".to_string()],
            false,
            "SumiLens",
        );
        let f = UrlFrontier::new(Arc::new(filter), 10);

        assert!(matches!(
            f.admit("https://x.com/logout", DiscoverySource::Domain),
            AdmitResult::Rejected(RejectReason::Blacklisted(_))
        ));
        assert!(matches!(
            f.admit("https://x.com/logo.png", DiscoverySource::Domain),
            AdmitResult::Rejected(RejectReason::FileType(_))
        ));
        assert_eq!(f.state_of("https://x.com/logout"), Some(UrlState::Excluded));

        // Offering it again is a duplicate, not a second rejection
        assert_eq!(
            f.admit("https://x.com/logout", DiscoverySource::Domain),
            AdmitResult::Duplicate
        );
    }

    #[tokio::test]
    async fn test_next_dispatches_in_fifo_order() {
        let f = frontier(10);
        f.admit("https://x.com/1", DiscoverySource::Seed);
        f.admit("https://x.com/2", DiscoverySource::Seed);

        let first = f.next().await.unwrap();
        assert_eq!(first.canonical_url, "https://x.com/1");
        assert_eq!(first.state, UrlState::InProgress);
        assert_eq!(f.state_of("https://x.com/1"), Some(UrlState::InProgress));

        let second = f.next().await.unwrap();
        assert_eq!(second.canonical_url, "https://x.com/2");
    }

    #[tokio::test]
    async fn test_next_returns_none_when_drained() {
        let f = frontier(10);
        f.admit("https://x.com/", DiscoverySource::Seed);

        let record = f.next().await.unwrap();
        f.mark_result(&record.canonical_url, scanned()).unwrap();

        assert!(f.next().await.is_none());
        assert_eq!(f.scanned_count(), 1);
    }

    #[tokio::test]
    async fn test_next_waits_for_in_flight_work() {
        let f = Arc::new(frontier(10));
        f.admit("https://x.com/", DiscoverySource::Seed);
        let record = f.next().await.unwrap();

        let waiter = {
            let f = Arc::clone(&f);
            tokio::spawn(async move { f.next().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // The in-flight page discovers a link, then completes
        f.admit("https://x.com/child", DiscoverySource::Domain);
        f.mark_result(&record.canonical_url, scanned()).unwrap();

        let next = waiter.await.unwrap().unwrap();
        assert_eq!(next.canonical_url, "https://x.com/child");
    }

    #[tokio::test]
    async fn test_budget_limits_dispatch() {
        let f = frontier(2);
        for i in 0..5 {
            f.admit(&format!("https://x.com/{}", i), DiscoverySource::Domain);
        }

        let a = f.next().await.unwrap();
        let b = f.next().await.unwrap();
        f.mark_result(&a.canonical_url, scanned()).unwrap();
        f.mark_result(&b.canonical_url, scanned()).unwrap();

        assert!(f.next().await.is_none());
        assert!(f.budget_exhausted());
        assert_eq!(f.queued_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_page_frees_budget() {
        let f = frontier(1);
        f.admit("https://x.com/a", DiscoverySource::Seed);
        f.admit("https://x.com/b", DiscoverySource::Seed);

        let a = f.next().await.unwrap();
        f.mark_result(
            &a.canonical_url,
            VisitOutcome::Failed {
                reason: "connection refused".to_string(),
                http_status: None,
            },
        )
        .unwrap();

        let b = f.next().await.unwrap();
        assert_eq!(b.canonical_url, "https://x.com/b");
    }

    #[tokio::test]
    async fn test_halt_wakes_waiters() {
        let f = Arc::new(frontier(10));
        f.admit("https://x.com/", DiscoverySource::Seed);
        let _in_flight = f.next().await.unwrap();

        let waiter = {
            let f = Arc::clone(&f);
            tokio::spawn(async move { f.next().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        f.halt();
        assert!(waiter.await.unwrap().is_none());
        assert!(f.is_halted());
    }

    #[tokio::test]
    async fn test_no_url_dispatched_twice() {
        let f = frontier(100);
        f.admit("https://x.com/", DiscoverySource::Seed);
        let record = f.next().await.unwrap();
        f.mark_result(&record.canonical_url, scanned()).unwrap();

        assert_eq!(
            f.admit("https://x.com/", DiscoverySource::Domain),
            AdmitResult::Duplicate
        );
        assert!(f.next().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let f = frontier(10);
        f.admit("https://x.com/", DiscoverySource::Seed);

        // Still Queued: cannot jump to Scanned
        let err = f.mark_result("https://x.com/", scanned()).unwrap_err();
        assert!(matches!(err, ScanError::InvalidTransition { .. }));

        let err = f.mark_result("https://x.com/unknown", scanned()).unwrap_err();
        assert!(matches!(err, ScanError::UnknownUrl(_)));
    }

    #[tokio::test]
    async fn test_concurrent_workers_never_share_a_url() {
        let f = Arc::new(frontier(1000));
        for i in 0..200 {
            f.admit(&format!("https://x.com/{}", i), DiscoverySource::Domain);
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let f = Arc::clone(&f);
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(record) = f.next().await {
                    seen.push(record.canonical_url.clone());
                    f.mark_result(&record.canonical_url, scanned()).unwrap();
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
        assert_eq!(total, 200);
    }

    #[test]
    fn test_archive_in_discovery_order() {
        let f = frontier(10);
        f.admit("https://x.com/b", DiscoverySource::Sitemap);
        f.admit("https://x.com/a", DiscoverySource::Domain);

        let archived = f.archive();
        assert_eq!(archived[0].canonical_url, "https://x.com/b");
        assert_eq!(archived[0].discovered_from, DiscoverySource::Sitemap);
        assert_eq!(archived[1].canonical_url, "https://x.com/a");
    }
}

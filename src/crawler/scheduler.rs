//! Bounded worker pool that drains the frontier
//!
//! This module handles:
//! - One rendering session per worker for the worker's lifetime
//! - Navigation timeouts and retries
//! - Rule evaluation and merging into the scan session
//! - Threshold checks after every merge
//! - Following or collecting same-site links

use crate::aggregate::{Finding, PageVisitResult, ThresholdStatus, VisitStatus};
use crate::config::CrawlBudget;
use crate::crawler::evaluator::RuleEvaluator;
use crate::crawler::parser::LinkExtractor;
use crate::crawler::renderer::{
    NavigationError, RenderSession, RenderedPage, Renderer, VisitOptions,
};
use crate::events::{EventBus, ScanEvent};
use crate::frontier::{AdmitResult, UrlFrontier, UrlRecord, VisitOutcome};
use crate::state::{DiscoverySource, ScanSession, UrlState};
use crate::url::{canonicalize_url, in_scope};
use crate::ScanError;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use url::Url;

/// Pause between visits in safe mode
const SAFE_MODE_DELAY: Duration = Duration::from_secs(1);

/// Progress is logged every this many pages
const PROGRESS_INTERVAL: u64 = 10;

/// What to do with links found on a scanned page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPolicy {
    /// Admit same-site links to the frontier
    Follow,
    /// Remember same-site links for a later phase
    Collect,
    Ignore,
}

/// Everything a worker needs, shared by all workers of one run
pub struct CrawlContext {
    pub budget: CrawlBudget,
    /// Scope root for link following and redirect checks
    pub root: Url,
    pub frontier: Arc<UrlFrontier>,
    pub session: Arc<ScanSession>,
    pub events: EventBus,
    pub renderer: Arc<dyn Renderer>,
    pub evaluator: Arc<dyn RuleEvaluator>,
    pub links: Arc<dyn LinkExtractor>,
    /// Used to fetch robots.txt for newly seen origins
    pub robots_client: Option<Client>,
}

impl CrawlContext {
    /// Offers a URL to the frontier and publishes what happened
    pub fn admit(&self, raw_url: &str, source: DiscoverySource) -> AdmitResult {
        let result = self.frontier.admit(raw_url, source);
        match &result {
            AdmitResult::Admitted(url) => tracing::debug!("Queued {}", url),
            AdmitResult::Duplicate => self.events.emit(ScanEvent::Duplicate {
                url: raw_url.to_string(),
            }),
            AdmitResult::Rejected(reason) => self.events.emit(ScanEvent::Skipped {
                url: raw_url.to_string(),
                reason: reason.to_string(),
            }),
        }
        result
    }

    /// Loads robots.txt for the URL's origin, then admits it
    pub async fn admit_polite(&self, url: &Url, source: DiscoverySource) -> AdmitResult {
        if let Some(client) = &self.robots_client {
            self.frontier.filter().load_robots(client, url).await;
        }
        self.admit(url.as_str(), source)
    }
}

/// Result of one scheduler run
#[derive(Debug, Default)]
pub struct CrawlSummary {
    /// Pages dispatched by this run
    pub visited: usize,
    /// Same-site links seen under [`LinkPolicy::Collect`]
    pub deferred_links: Vec<Url>,
}

/// Runs `effective_concurrency` workers until the frontier is drained
pub struct ConcurrencyScheduler {
    ctx: Arc<CrawlContext>,
}

impl ConcurrencyScheduler {
    pub fn new(ctx: Arc<CrawlContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, policy: LinkPolicy) -> Result<CrawlSummary, ScanError> {
        let workers = self.ctx.budget.effective_concurrency();
        let deferred: Arc<Mutex<Vec<Url>>> = Arc::new(Mutex::new(Vec::new()));

        tracing::info!(
            "Starting {} worker(s), budget {} pages",
            workers,
            self.ctx.budget.max_pages
        );

        let mut set = JoinSet::new();
        for id in 0..workers {
            let ctx = Arc::clone(&self.ctx);
            let deferred = Arc::clone(&deferred);
            set.spawn(async move { run_worker(id, ctx, policy, deferred).await });
        }

        let mut visited = 0;
        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(count)) => visited += count,
                Ok(Err(e)) => {
                    tracing::error!("Worker stopped: {}", e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!("Worker panicked: {}", e);
                    first_error.get_or_insert(ScanError::Renderer(e.to_string()));
                }
            }
        }

        if visited == 0 {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        let deferred_links = match Arc::try_unwrap(deferred) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(|p| p.into_inner()),
            Err(shared) => lock(&shared).clone(),
        };

        Ok(CrawlSummary {
            visited,
            deferred_links,
        })
    }
}

async fn run_worker(
    id: usize,
    ctx: Arc<CrawlContext>,
    policy: LinkPolicy,
    deferred: Arc<Mutex<Vec<Url>>>,
) -> Result<usize, ScanError> {
    let mut render = ctx.renderer.open_session().await?;
    let mut visited = 0;

    while let Some(record) = ctx.frontier.next().await {
        tracing::debug!("Worker {} visiting {}", id, record.canonical_url);
        if let Err(e) = process_url(&ctx, render.as_mut(), record, policy, &deferred).await {
            tracing::error!("Worker {} failed to record a visit: {}", id, e);
        }
        visited += 1;

        if ctx.budget.safe_mode {
            tokio::time::sleep(SAFE_MODE_DELAY).await;
        }
    }

    render.close().await;
    tracing::debug!("Worker {} finished after {} pages", id, visited);
    Ok(visited)
}

/// Visits one dispatched URL and moves it to a terminal state
async fn process_url(
    ctx: &CrawlContext,
    render: &mut dyn RenderSession,
    mut record: UrlRecord,
    policy: LinkPolicy,
    deferred: &Mutex<Vec<Url>>,
) -> Result<(), ScanError> {
    let started_at = Utc::now();
    let url = match Url::parse(&record.canonical_url) {
        Ok(url) => url,
        Err(e) => {
            return finish(ctx, &record, Terminal::failed(e.to_string(), None), started_at);
        }
    };

    let visit = visit_with_retries(ctx, render, &url, &mut record).await;

    let page = match visit {
        Ok(page) => page,
        Err(e) => {
            let reason = e.into_scan_error(&url).to_string();
            tracing::warn!("{}", reason);
            return finish(ctx, &record, Terminal::failed(reason, None), started_at);
        }
    };

    if !page.is_success() {
        let reason = format!("HTTP {}", page.http_status);
        tracing::warn!("{} answered {}", url, reason);
        return finish(
            ctx,
            &record,
            Terminal::failed(reason, Some(page.http_status)).at(&page.final_url),
            started_at,
        );
    }

    if !page.is_html() {
        let reason = format!("non-HTML content type {}", page.content_type);
        tracing::debug!("Excluding {}: {}", url, reason);
        return finish(
            ctx,
            &record,
            Terminal::excluded(reason, page.http_status).at(&page.final_url),
            started_at,
        );
    }

    if redirected_out_of_scope(ctx, &url, &page.final_url) {
        let reason = format!("redirected out of scope to {}", page.final_url);
        tracing::debug!("Excluding {}: {}", url, reason);
        return finish(
            ctx,
            &record,
            Terminal::excluded(reason, page.http_status).at(&page.final_url),
            started_at,
        );
    }

    let (findings, evaluation_error) = match evaluate_with_retry(ctx, &url, &page.dom).await {
        Ok(findings) => (findings, None),
        Err(e) => {
            tracing::warn!("Rule evaluation failed for {}: {}", url, e);
            (Vec::new(), Some(e.to_string()))
        }
    };

    let findings: Vec<Finding> = findings
        .into_iter()
        .map(|mut finding| {
            if finding.page_url.is_empty() {
                finding.page_url = record.canonical_url.clone();
            }
            finding
        })
        .collect();
    let finding_count = findings.len() as u64;

    let result = PageVisitResult {
        url: record.canonical_url.clone(),
        status: VisitStatus::Http {
            status: page.http_status,
        },
        findings,
        started_at,
        finished_at: Utc::now(),
    };

    let (merge, threshold) = ctx.session.merge_page(&result);
    if let ThresholdStatus::Triggered(reason) = threshold {
        ctx.frontier.halt();
        ctx.events.emit(ScanEvent::Aborted { reason });
    }

    if !ctx.session.is_aborted() {
        handle_links(ctx, &page, policy, deferred).await;
    }

    ctx.frontier.mark_result(
        &record.canonical_url,
        VisitOutcome::Scanned {
            http_status: Some(page.http_status),
        },
    )?;

    let order = ctx.session.record_page(
        &record,
        UrlState::Scanned,
        Some(page.final_url.to_string()),
        Some(page.http_status),
        evaluation_error,
        finding_count,
        started_at,
        result.finished_at,
    );

    ctx.events.emit(ScanEvent::Scanned {
        url: record.canonical_url.clone(),
        order,
        findings: finding_count,
        new_issues: merge.new_issues,
    });

    let done = order + 1;
    if done % PROGRESS_INTERVAL == 0 {
        let counts = merge.counts;
        tracing::info!(
            "Progress: {} pages scanned, {} issues, {} mustFix / {} goodToFix occurrences",
            done,
            ctx.session.aggregator().issue_count(),
            counts.must_fix(),
            counts.good_to_fix()
        );
    }

    Ok(())
}

async fn visit_with_retries(
    ctx: &CrawlContext,
    render: &mut dyn RenderSession,
    url: &Url,
    record: &mut UrlRecord,
) -> Result<RenderedPage, NavigationError> {
    let options = VisitOptions::from_budget(&ctx.budget);
    let timeout_ms = options.timeout_ms;
    let attempts = ctx.budget.max_retries + 1;
    let mut last_error = NavigationError::Network("not attempted".to_string());

    for attempt in 1..=attempts {
        record.attempts = ctx.frontier.record_attempt(&record.canonical_url);

        let visit = render.visit(url, &options);
        let outcome = match tokio::time::timeout(Duration::from_millis(timeout_ms), visit).await {
            Ok(outcome) => outcome,
            Err(_) => Err(NavigationError::Timeout { timeout_ms }),
        };

        match outcome {
            Ok(page) => return Ok(page),
            Err(e) => {
                if attempt < attempts {
                    tracing::debug!(
                        "Attempt {}/{} for {} failed: {}, retrying",
                        attempt,
                        attempts,
                        url,
                        e
                    );
                }
                last_error = e;
            }
        }
    }

    Err(last_error)
}

async fn evaluate_with_retry(
    ctx: &CrawlContext,
    url: &Url,
    dom: &str,
) -> Result<Vec<Finding>, ScanError> {
    let timeout = Duration::from_millis(ctx.budget.navigation_timeout_ms);
    let mut last_error = String::new();

    for attempt in 1..=2 {
        match tokio::time::timeout(timeout, ctx.evaluator.evaluate(url, dom)).await {
            Ok(Ok(findings)) => return Ok(findings),
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("timed out after {}ms", timeout.as_millis()),
        }
        if attempt == 1 {
            tracing::debug!("Retrying rule evaluation for {}: {}", url, last_error);
        }
    }

    Err(ScanError::RuleEvaluationFailure {
        url: url.to_string(),
        message: last_error,
    })
}

fn redirected_out_of_scope(ctx: &CrawlContext, requested: &Url, final_url: &Url) -> bool {
    if final_url == requested {
        return false;
    }
    // Sitemaps may list pages on other hosts; those are judged against themselves
    let scope_root = if in_scope(&ctx.root, requested, ctx.budget.scope) {
        &ctx.root
    } else {
        requested
    };
    !in_scope(scope_root, final_url, ctx.budget.scope)
}

async fn handle_links(
    ctx: &CrawlContext,
    page: &RenderedPage,
    policy: LinkPolicy,
    deferred: &Mutex<Vec<Url>>,
) {
    if policy == LinkPolicy::Ignore {
        return;
    }

    let links: Vec<Url> = ctx
        .links
        .extract_links(&page.dom, &page.final_url)
        .into_iter()
        .filter(|link| in_scope(&ctx.root, link, ctx.budget.scope))
        .collect();

    match policy {
        LinkPolicy::Follow => {
            let mut admitted = 0;
            for link in &links {
                if ctx.admit_polite(link, DiscoverySource::Domain).await.is_admitted() {
                    admitted += 1;
                }
            }
            tracing::debug!(
                "{}: {} links in scope, {} new",
                page.final_url,
                links.len(),
                admitted
            );
        }
        LinkPolicy::Collect => {
            let canonical = links
                .into_iter()
                .filter_map(|link| canonicalize_url(link.as_str()).ok());
            lock(deferred).extend(canonical);
        }
        LinkPolicy::Ignore => {}
    }
}

/// Terminal outcome for a page that was not scanned
struct Terminal {
    outcome: VisitOutcome,
    reason: String,
    http_status: Option<u16>,
    final_url: Option<String>,
}

impl Terminal {
    fn failed(reason: String, http_status: Option<u16>) -> Self {
        Self {
            outcome: VisitOutcome::Failed {
                reason: reason.clone(),
                http_status,
            },
            reason,
            http_status,
            final_url: None,
        }
    }

    fn excluded(reason: String, http_status: u16) -> Self {
        Self {
            outcome: VisitOutcome::Excluded {
                reason: reason.clone(),
            },
            reason,
            http_status: Some(http_status),
            final_url: None,
        }
    }

    fn at(mut self, final_url: &Url) -> Self {
        self.final_url = Some(final_url.to_string());
        self
    }
}

fn finish(
    ctx: &CrawlContext,
    record: &UrlRecord,
    terminal: Terminal,
    started_at: DateTime<Utc>,
) -> Result<(), ScanError> {
    let Terminal {
        outcome,
        reason,
        http_status,
        final_url,
    } = terminal;
    let state = outcome.target_state();

    ctx.frontier.mark_result(&record.canonical_url, outcome)?;
    ctx.session.record_page(
        record,
        state,
        final_url,
        http_status,
        Some(reason.clone()),
        0,
        started_at,
        Utc::now(),
    );

    let url = record.canonical_url.clone();
    match state {
        UrlState::Excluded => ctx.events.emit(ScanEvent::Skipped { url, reason }),
        _ => ctx.events.emit(ScanEvent::Failed { url, reason }),
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

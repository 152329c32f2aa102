//! Scan orchestration
//!
//! This module picks the crawl strategy for a scan type and runs it against
//! one shared frontier and scan session:
//! - `website`: link-following from the seed
//! - `sitemap`: the pages listed in the sitemap given as the seed
//! - `intelligent`: sitemap discovery, then link-following to fill the budget
//! - `localfile`: a local sitemap or a single local HTML page

use crate::aggregate::AbortReason;
use crate::config::{Config, CrawlBudget, ScanType, ThresholdConfig};
use crate::crawler::evaluator::{CommandEvaluator, NullEvaluator, RuleEvaluator};
use crate::crawler::filter::PoliteFilter;
use crate::crawler::parser::{HtmlLinkExtractor, LinkExtractor};
use crate::crawler::renderer::{build_http_client, HttpRenderer, Renderer};
use crate::crawler::scheduler::{ConcurrencyScheduler, CrawlContext, LinkPolicy};
use crate::crawler::sitemap::{Discovery, HttpSitemapSource, SitemapDiscoverer, SitemapSource};
use crate::crawler::strategy::{DomainCrawl, SitemapCrawl};
use crate::events::{EventBus, Phase, ScanEvent};
use crate::frontier::UrlFrontier;
use crate::output::write_outputs;
use crate::state::{DiscoverySource, ScanReport, ScanSession, StrategyUsed};
use crate::storage::{SqliteStorage, Storage};
use crate::url::canonicalize_url;
use crate::{ConfigError, ScanError, UrlError};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Result of a scan that ran to completion or was aborted by a threshold
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub report: ScanReport,
}

impl ScanOutcome {
    pub fn aborted(&self) -> bool {
        self.report.is_aborted()
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.report.abort
    }

    pub fn scanned(&self) -> usize {
        self.report.scanned_count()
    }
}

/// Runs one scan from seed to report
pub struct IntelligentOrchestrator {
    scan_type: ScanType,
    seed: String,
    budget: CrawlBudget,
    thresholds: ThresholdConfig,
    filter: Arc<PoliteFilter>,
    renderer: Arc<dyn Renderer>,
    evaluator: Arc<dyn RuleEvaluator>,
    links: Arc<dyn LinkExtractor>,
    sitemaps: Arc<dyn SitemapSource>,
    events: EventBus,
    robots_client: Option<Client>,
}

impl IntelligentOrchestrator {
    /// Creates an orchestrator with a permissive filter and no thresholds
    pub fn new(
        scan_type: ScanType,
        seed: impl Into<String>,
        budget: CrawlBudget,
        renderer: Arc<dyn Renderer>,
        evaluator: Arc<dyn RuleEvaluator>,
        sitemaps: Arc<dyn SitemapSource>,
    ) -> Self {
        Self {
            scan_type,
            seed: seed.into(),
            budget,
            thresholds: ThresholdConfig::default(),
            filter: Arc::new(PoliteFilter::permissive()),
            renderer,
            evaluator,
            links: Arc::new(HtmlLinkExtractor),
            sitemaps,
            events: EventBus::new(),
            robots_client: None,
        }
    }

    pub fn with_filter(mut self, filter: PoliteFilter) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn with_thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_links(mut self, links: Arc<dyn LinkExtractor>) -> Self {
        self.links = links;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Fetches robots.txt with this client for every new origin
    pub fn with_robots_client(mut self, client: Client) -> Self {
        self.robots_client = Some(client);
        self
    }

    /// Wires the HTTP adapters described by a validated configuration
    pub fn from_config(config: &Config) -> Result<Self, ScanError> {
        let client = build_http_client(config)?;
        let filter = PoliteFilter::from_config(config)?;

        let mut renderer = HttpRenderer::new(client.clone());
        if let Ok(seed) = Url::parse(&config.scan.url) {
            renderer = renderer.with_seed_credentials(&seed);
        }

        let evaluator: Arc<dyn RuleEvaluator> =
            match CommandEvaluator::from_command(&config.evaluator.command) {
                Some(command) => Arc::new(command),
                None => {
                    tracing::warn!("No evaluator command configured; pages will not be evaluated");
                    Arc::new(NullEvaluator)
                }
            };

        let mut orchestrator = Self::new(
            config.scan.scan_type,
            config.scan.url.clone(),
            config.crawl_budget(),
            Arc::new(renderer),
            evaluator,
            Arc::new(HttpSitemapSource::new(client.clone())),
        )
        .with_filter(filter)
        .with_thresholds(config.thresholds);

        if config.crawl.follow_robots {
            orchestrator = orchestrator.with_robots_client(client);
        }

        Ok(orchestrator)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn budget(&self) -> &CrawlBudget {
        &self.budget
    }

    /// Runs the scan
    ///
    /// An abort raised by a threshold is not an error: the truncated report
    /// is returned and [`ScanOutcome::aborted`] is set.
    pub async fn run(&self) -> Result<ScanOutcome, ScanError> {
        if self.scan_type == ScanType::Custom {
            return Err(ConfigError::Unsupported(
                "custom scans need an interactive user flow".to_string(),
            )
            .into());
        }

        tracing::info!(
            "Starting {} scan of {} (budget {} pages, {} worker(s))",
            self.scan_type,
            self.seed,
            self.budget.max_pages,
            self.budget.effective_concurrency()
        );

        let session = Arc::new(ScanSession::new(
            self.seed.clone(),
            self.scan_type,
            self.thresholds,
        ));
        let frontier = Arc::new(UrlFrontier::new(
            Arc::clone(&self.filter),
            self.budget.max_pages,
        ));

        match self.scan_type {
            ScanType::Website => self.run_website(&session, &frontier).await?,
            ScanType::Sitemap => self.run_sitemap(&session, &frontier).await?,
            ScanType::Intelligent => self.run_intelligent(&session, &frontier).await?,
            ScanType::LocalFile => self.run_local_file(&session, &frontier).await?,
            ScanType::Custom => {}
        }

        let report = session.finish(
            frontier.archive(),
            frontier.invalid_urls(),
            frontier.duplicates(),
        );

        self.events.emit(ScanEvent::Completed {
            scanned: report.scanned_count(),
            issues: report.issues.len(),
        });

        let crawled = &report.urls_crawled;
        tracing::info!(
            "Scan finished in {}s: {} scanned, {} failed, {} excluded, {} issues ({} occurrences)",
            report.duration().num_seconds(),
            crawled.scanned.len(),
            crawled.failed.len(),
            crawled.excluded.len(),
            report.issues.len(),
            report.severity_counts.total()
        );
        if let Some(reason) = report.abort {
            tracing::warn!("Scan aborted: {}", reason);
        }

        Ok(ScanOutcome { report })
    }

    fn context(
        &self,
        root: Url,
        session: &Arc<ScanSession>,
        frontier: &Arc<UrlFrontier>,
    ) -> Arc<CrawlContext> {
        Arc::new(CrawlContext {
            budget: self.budget.clone(),
            root,
            frontier: Arc::clone(frontier),
            session: Arc::clone(session),
            events: self.events.clone(),
            renderer: Arc::clone(&self.renderer),
            evaluator: Arc::clone(&self.evaluator),
            links: Arc::clone(&self.links),
            robots_client: self.robots_client.clone(),
        })
    }

    fn start_phase(&self, phase: Phase) {
        tracing::info!("Phase: {:?}", phase);
        self.events.emit(ScanEvent::PhaseStarted { phase });
    }

    async fn run_website(
        &self,
        session: &Arc<ScanSession>,
        frontier: &Arc<UrlFrontier>,
    ) -> Result<(), ScanError> {
        let root = canonicalize_url(&self.seed)?;
        let ctx = self.context(root.clone(), session, frontier);

        session.set_strategy(StrategyUsed::Domain);
        self.start_phase(Phase::DomainCrawl);
        DomainCrawl::new(ctx).run(&[root]).await?;
        Ok(())
    }

    async fn run_sitemap(
        &self,
        session: &Arc<ScanSession>,
        frontier: &Arc<UrlFrontier>,
    ) -> Result<(), ScanError> {
        let root = canonicalize_url(&self.seed)?;
        let ctx = self.context(root, session, frontier);

        session.set_strategy(StrategyUsed::Sitemap);
        self.start_phase(Phase::SitemapCrawl);
        SitemapCrawl::new(ctx, self.sitemaps.as_ref())
            .run(&self.seed, None, LinkPolicy::Ignore)
            .await?;
        Ok(())
    }

    async fn run_intelligent(
        &self,
        session: &Arc<ScanSession>,
        frontier: &Arc<UrlFrontier>,
    ) -> Result<(), ScanError> {
        // Probing keeps the seed's credentials; the scope root does not
        let requested = Url::parse(&self.seed)?;
        let root = canonicalize_url(&self.seed)?;
        let ctx = self.context(root.clone(), session, frontier);

        self.start_phase(Phase::SitemapDiscovery);
        let mut strategy = StrategyUsed::Domain;
        let mut deferred = Vec::new();

        match SitemapDiscoverer::new(self.sitemaps.as_ref())
            .discover(&requested)
            .await
        {
            Discovery::Found(location) => {
                strategy = StrategyUsed::Sitemap;
                session.set_strategy(strategy);
                self.start_phase(Phase::SitemapCrawl);

                let summary = SitemapCrawl::new(Arc::clone(&ctx), self.sitemaps.as_ref())
                    .run(location.as_str(), Some(&root), LinkPolicy::Collect)
                    .await?;
                tracing::info!(
                    "Sitemap phase visited {} page(s), {} links carried over",
                    summary.visited,
                    summary.deferred_links.len()
                );
                deferred = summary.deferred_links;
            }
            Discovery::NotFound => {}
        }

        if session.is_aborted() {
            tracing::info!("Threshold exceeded during the sitemap phase; skipping link crawl");
            return Ok(());
        }
        if frontier.budget_exhausted() {
            tracing::info!("Page budget met by the sitemap; skipping link crawl");
            return Ok(());
        }

        session.set_strategy(strategy.then_domain());
        self.start_phase(Phase::DomainCrawl);

        let mut seeds = Vec::with_capacity(deferred.len() + 1);
        seeds.push(root);
        seeds.extend(deferred);
        DomainCrawl::new(ctx).run(&seeds).await?;
        Ok(())
    }

    async fn run_local_file(
        &self,
        session: &Arc<ScanSession>,
        frontier: &Arc<UrlFrontier>,
    ) -> Result<(), ScanError> {
        let path = tokio::fs::canonicalize(local_path(&self.seed)?).await?;
        let file_url = Url::from_file_path(&path)
            .map_err(|_| UrlError::Malformed(path.display().to_string()))?;
        let ctx = self.context(file_url.clone(), session, frontier);

        session.set_strategy(StrategyUsed::LocalFile);
        self.start_phase(Phase::LocalFile);

        if is_sitemap_file(&path) {
            let location = path.to_string_lossy();
            SitemapCrawl::new(ctx, self.sitemaps.as_ref())
                .run(&location, None, LinkPolicy::Ignore)
                .await?;
        } else {
            ctx.admit(file_url.as_str(), DiscoverySource::Seed);
            ConcurrencyScheduler::new(ctx)
                .run(LinkPolicy::Ignore)
                .await?;
        }
        Ok(())
    }
}

/// Accepts a plain path or a `file://` URL
fn local_path(seed: &str) -> Result<PathBuf, ScanError> {
    if seed.starts_with("file:") {
        let url = Url::parse(seed)?;
        return url
            .to_file_path()
            .map_err(|_| UrlError::Malformed(seed.to_string()).into());
    }
    Ok(PathBuf::from(seed))
}

fn is_sitemap_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("xml") || ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}

/// Runs a configured scan and persists its results
///
/// The scan row is created before crawling and marked failed if the scan
/// errors out. An aborted scan is persisted like a completed one; it is up to
/// the caller to turn [`ScanReport::abort`] into an exit status. A scan that
/// scanned nothing is persisted and then reported as
/// [`ScanError::NothingScanned`].
///
/// # Example
///
/// ```no_run
/// use sumi_lens::config::load_config_with_hash;
/// use sumi_lens::crawler::run_scan;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("scan.toml"))?;
/// let report = run_scan(&config, &hash).await?;
/// println!("{} pages scanned", report.scanned_count());
/// # Ok(())
/// # }
/// ```
pub async fn run_scan(config: &Config, config_hash: &str) -> Result<ScanReport, ScanError> {
    let orchestrator = IntelligentOrchestrator::from_config(config)?;
    let storage_config = config.storage_config();

    let mut storage = SqliteStorage::new(&storage_config.database_path)?;
    let scan_id = storage.create_scan(&config.scan.url, config.scan.scan_type, config_hash)?;
    tracing::info!("Recording scan {}", scan_id);

    let outcome = match orchestrator.run().await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Scan {} failed: {}", scan_id, e);
            storage.fail_scan(scan_id, &e.to_string())?;
            return Err(e);
        }
    };

    storage.save_report(scan_id, &outcome.report)?;
    write_outputs(&outcome.report, &storage_config)?;

    if outcome.scanned() == 0 {
        return Err(ScanError::NothingScanned {
            url: config.scan.url.clone(),
        });
    }

    Ok(outcome.report)
}

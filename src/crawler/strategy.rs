//! Sitemap and domain crawl strategies
//!
//! Both strategies only seed the shared frontier and then hand it to the
//! [`ConcurrencyScheduler`]; they differ in where URLs come from and in what
//! happens to links found on scanned pages.

use crate::crawler::scheduler::{ConcurrencyScheduler, CrawlContext, CrawlSummary, LinkPolicy};
use crate::crawler::sitemap::{collect_sitemap_urls, rank_by_closeness, SitemapSource};
use crate::state::DiscoverySource;
use crate::ScanError;
use std::sync::Arc;
use url::Url;

/// Scans the pages listed in a sitemap
pub struct SitemapCrawl<'a> {
    ctx: Arc<CrawlContext>,
    source: &'a dyn SitemapSource,
}

impl<'a> SitemapCrawl<'a> {
    pub fn new(ctx: Arc<CrawlContext>, source: &'a dyn SitemapSource) -> Self {
        Self { ctx, source }
    }

    /// Admits the sitemap's pages and crawls them
    ///
    /// A sitemap that cannot be fetched or parsed admits nothing; that is
    /// not an error. With `closest_to` set, pages are admitted in order of
    /// closeness to that URL.
    pub async fn run(
        &self,
        location: &str,
        closest_to: Option<&Url>,
        policy: LinkPolicy,
    ) -> Result<CrawlSummary, ScanError> {
        let limit = self.ctx.budget.max_sitemap_links;
        let mut entries = match collect_sitemap_urls(self.source, location, limit).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Could not read sitemap {}: {}", location, e);
                Vec::new()
            }
        };

        if let Some(target) = closest_to {
            rank_by_closeness(&mut entries, target);
        }

        let frontier = &self.ctx.frontier;
        let room = frontier.max_pages().saturating_sub(frontier.scanned_count());
        let listed = entries.len();
        let mut admitted = 0;

        for entry in entries {
            if admitted >= room {
                break;
            }
            let result = match Url::parse(&entry.url) {
                Ok(url) => self.ctx.admit_polite(&url, DiscoverySource::Sitemap).await,
                Err(_) => self.ctx.admit(&entry.url, DiscoverySource::Sitemap),
            };
            if result.is_admitted() {
                admitted += 1;
            }
        }

        tracing::info!(
            "Sitemap {} listed {} pages, {} admitted",
            location,
            listed,
            admitted
        );

        if admitted == 0 {
            return Ok(CrawlSummary::default());
        }

        ConcurrencyScheduler::new(Arc::clone(&self.ctx))
            .run(policy)
            .await
    }
}

/// Breadth-first link following from one or more seeds
///
/// Depth is unbounded; the page budget is what stops the crawl.
pub struct DomainCrawl {
    ctx: Arc<CrawlContext>,
}

impl DomainCrawl {
    pub fn new(ctx: Arc<CrawlContext>) -> Self {
        Self { ctx }
    }

    /// The first seed is the site root; the rest are links carried over from
    /// an earlier phase. Seeds already visited are skipped as duplicates.
    pub async fn run(&self, seeds: &[Url]) -> Result<CrawlSummary, ScanError> {
        for (i, seed) in seeds.iter().enumerate() {
            let source = if i == 0 {
                DiscoverySource::Seed
            } else {
                DiscoverySource::Domain
            };
            self.ctx.admit_polite(seed, source).await;
        }

        if self.ctx.frontier.queued_count() == 0 {
            tracing::info!("Nothing new to crawl from {} seed(s)", seeds.len());
            return Ok(CrawlSummary::default());
        }

        ConcurrencyScheduler::new(Arc::clone(&self.ctx))
            .run(LinkPolicy::Follow)
            .await
    }
}

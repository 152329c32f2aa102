//! Crawler module for page discovery, rendering and evaluation
//!
//! This module contains the core scanning logic, including:
//! - Sitemap discovery and parsing
//! - Rendering pages over HTTP or from local files
//! - Link extraction and polite URL filtering
//! - The bounded worker pool and the crawl strategies built on it
//! - Overall scan orchestration

mod coordinator;
mod evaluator;
#[cfg(test)]
pub(crate) mod fakes;
mod filter;
mod parser;
mod renderer;
mod scheduler;
pub mod sitemap;
mod strategy;

pub use coordinator::{run_scan, IntelligentOrchestrator, ScanOutcome};
pub use evaluator::{CommandEvaluator, EvaluationError, NullEvaluator, RuleEvaluator};
pub use filter::PoliteFilter;
pub use parser::{extract_title, HtmlLinkExtractor, LinkExtractor};
pub use renderer::{
    build_http_client, HttpRenderer, NavigationError, RenderSession, RenderedPage, Renderer,
    VisitOptions,
};
pub use scheduler::{ConcurrencyScheduler, CrawlContext, CrawlSummary, LinkPolicy};
pub use sitemap::{Discovery, HttpSitemapSource, SitemapDiscoverer, SitemapSource};
pub use strategy::{DomainCrawl, SitemapCrawl};

//! Sumi-Lens: a polite accessibility crawl engine
//!
//! This crate discovers the pages of a site (sitemap first, link-following
//! fallback), visits each page exactly once under a concurrency and page budget,
//! hands every rendered page to an external rule evaluator, and merges the
//! findings into one deduplicated, severity-bucketed report. Configured
//! thresholds can abort a scan early; the truncated result is still persisted.

pub mod aggregate;
pub mod config;
pub mod crawler;
pub mod events;
pub mod frontier;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Lens operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network failure for {url}: {message}")]
    NetworkFailure { url: String, message: String },

    #[error("Navigation timed out after {timeout_ms}ms for {url}")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("Invalid sitemap at {location}: {message}")]
    InvalidSitemap { location: String, message: String },

    #[error("Rule evaluation failed for {url}: {message}")]
    RuleEvaluationFailure { url: String, message: String },

    #[error("Scan aborted: {0}")]
    ThresholdExceeded(aggregate::AbortReason),

    #[error("No pages could be scanned from {url}")]
    NothingScanned { url: String },

    #[error("Invalid state transition for {url}: {from} -> {to}")]
    InvalidTransition {
        url: String,
        from: state::UrlState,
        to: state::UrlState,
    },

    #[error("URL is not tracked by the frontier: {0}")]
    UnknownUrl(String),

    #[error("Renderer error: {0}")]
    Renderer(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// Every variant is fatal before crawling starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid blacklist pattern: {0}")]
    InvalidPattern(String),

    #[error("Unsupported scan type: {0}")]
    Unsupported(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Lens operations
pub type Result<T> = std::result::Result<T, ScanError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use aggregate::{AbortReason, Finding, ResultAggregator, Severity, ThresholdMonitor};
pub use config::{Config, CrawlBudget, DeviceProfile, ScanType, StorageConfig};
pub use crawler::{IntelligentOrchestrator, ScanOutcome};
pub use frontier::{AdmitResult, UrlFrontier, UrlRecord};
pub use state::{DiscoverySource, ScanSession, UrlState};
pub use url::{canonicalize_url, extract_domain};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// File extensions that are never scanned
pub const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &[
    "css", "js", "txt", "mp3", "mp4", "jpg", "jpeg", "png", "svg", "gif", "woff", "zip", "webp",
    "json", "pdf",
];

/// Main configuration structure for Sumi-Lens
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub scan: ScanSection,
    #[serde(default)]
    pub crawl: CrawlSection,
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub filters: FilterSection,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    /// Extra HTTP headers sent with every page visit
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Kind of scan to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    /// Scan the URLs listed in a sitemap given as the seed
    Sitemap,
    /// Follow same-site links from the seed
    Website,
    /// Interactive user flow
    Custom,
    /// Sitemap discovery, then link-following to fill the page budget
    Intelligent,
    /// Scan a local sitemap or HTML file
    #[serde(rename = "localfile")]
    #[value(name = "localfile")]
    LocalFile,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sitemap => "sitemap",
            Self::Website => "website",
            Self::Custom => "custom",
            Self::Intelligent => "intelligent",
            Self::LocalFile => "localfile",
        }
    }
}

impl std::fmt::Display for ScanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to scan
#[derive(Debug, Clone, Deserialize)]
pub struct ScanSection {
    #[serde(rename = "type")]
    pub scan_type: ScanType,

    /// Seed URL, sitemap URL, or local file path depending on the scan type
    pub url: String,
}

/// Which discovered links are considered part of the site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ScopePolicy {
    /// Exact host match
    SameHostname,
    /// Same registrable domain (last two host labels)
    SameDomain,
}

/// Crawl budget configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlSection {
    /// Maximum number of pages to scan
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: usize,

    /// Number of concurrent page visits
    #[serde(rename = "max-concurrency", default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-visit navigation timeout (milliseconds)
    #[serde(rename = "navigation-timeout-ms", default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,

    /// Retries after a network failure or navigation timeout
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(rename = "follow-robots", default = "default_true")]
    pub follow_robots: bool,

    #[serde(rename = "safe-mode", default)]
    pub safe_mode: bool,

    #[serde(rename = "include-screenshots", default)]
    pub include_screenshots: bool,

    #[serde(default = "default_scope")]
    pub scope: ScopePolicy,

    /// Upper bound on URLs read from sitemaps (defaults to max-pages)
    #[serde(rename = "max-sitemap-links")]
    pub max_sitemap_links: Option<usize>,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_concurrency: default_max_concurrency(),
            navigation_timeout_ms: default_navigation_timeout(),
            max_retries: default_max_retries(),
            follow_robots: true,
            safe_mode: false,
            include_screenshots: false,
            scope: default_scope(),
            max_sitemap_links: None,
        }
    }
}

/// Named device presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Desktop,
    Mobile,
    Custom,
}

/// Device emulation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSection {
    #[serde(default = "default_device")]
    pub profile: DeviceKind,

    /// Viewport width for the custom profile (320-1080)
    #[serde(rename = "viewport-width")]
    pub viewport_width: Option<u32>,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            profile: default_device(),
            viewport_width: None,
        }
    }
}

/// Device profile handed to the rendering collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    pub name: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: Option<String>,
    pub is_mobile: bool,
}

impl DeviceProfile {
    pub fn desktop() -> Self {
        Self {
            name: "desktop".to_string(),
            viewport_width: 1280,
            viewport_height: 720,
            user_agent: None,
            is_mobile: false,
        }
    }

    pub fn mobile() -> Self {
        Self {
            name: "mobile".to_string(),
            viewport_width: 414,
            viewport_height: 896,
            user_agent: Some(
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 \
                 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1"
                    .to_string(),
            ),
            is_mobile: true,
        }
    }

    pub fn custom(viewport_width: u32) -> Self {
        Self {
            name: format!("custom_{}", viewport_width),
            viewport_width,
            viewport_height: 720,
            user_agent: None,
            is_mobile: viewport_width < 768,
        }
    }
}

/// Exclusion rules applied before a URL reaches the frontier
#[derive(Debug, Clone, Deserialize)]
pub struct FilterSection {
    /// Regex patterns matched against the host name and the full URL
    #[serde(default)]
    pub blacklist: Vec<String>,

    #[serde(rename = "excluded-extensions", default = "default_extensions")]
    pub excluded_extensions: Vec<String>,
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            blacklist: Vec::new(),
            excluded_extensions: default_extensions(),
        }
    }
}

/// Occurrence limits per severity bucket; absent means unlimited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ThresholdConfig {
    #[serde(rename = "must-fix")]
    pub must_fix: Option<u64>,

    #[serde(rename = "good-to-fix")]
    pub good_to_fix: Option<u64>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    #[serde(rename = "crawler-name", default = "default_crawler_name")]
    pub crawler_name: String,

    #[serde(rename = "crawler-version", default = "default_crawler_version")]
    pub crawler_version: String,

    #[serde(rename = "contact-url")]
    pub contact_url: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_url: None,
        }
    }
}

impl UserAgentConfig {
    /// Formats the user agent header, e.g. `SumiLens/1.0 (+https://example.com/bot)`
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, contact
            ),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

/// External rule evaluator invocation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluatorConfig {
    /// Program and arguments; empty means no rule evaluation
    #[serde(default)]
    pub command: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    #[serde(rename = "summary-path", default = "default_summary_path")]
    pub summary_path: String,

    #[serde(rename = "report-path", default = "default_report_path")]
    pub report_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            summary_path: default_summary_path(),
            report_path: default_report_path(),
        }
    }
}

/// Immutable crawl budget injected into the orchestrator
#[derive(Debug, Clone)]
pub struct CrawlBudget {
    pub max_pages: usize,
    pub max_concurrency: usize,
    pub device_profile: DeviceProfile,
    pub include_screenshots: bool,
    pub follow_robots: bool,
    pub navigation_timeout_ms: u64,
    pub max_retries: u32,
    pub safe_mode: bool,
    pub scope: ScopePolicy,
    pub max_sitemap_links: usize,
}

impl CrawlBudget {
    /// Worker count after safe mode is applied
    pub fn effective_concurrency(&self) -> usize {
        if self.safe_mode {
            1
        } else {
            self.max_concurrency.max(1)
        }
    }
}

impl Default for CrawlBudget {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_concurrency: default_max_concurrency(),
            device_profile: DeviceProfile::desktop(),
            include_screenshots: false,
            follow_robots: true,
            navigation_timeout_ms: default_navigation_timeout(),
            max_retries: default_max_retries(),
            safe_mode: false,
            scope: default_scope(),
            max_sitemap_links: default_max_pages(),
        }
    }
}

/// Where scan results are written
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub summary_path: PathBuf,
    pub report_path: PathBuf,
}

fn default_max_pages() -> usize {
    100
}

fn default_max_concurrency() -> usize {
    25
}

fn default_navigation_timeout() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_scope() -> ScopePolicy {
    ScopePolicy::SameDomain
}

fn default_device() -> DeviceKind {
    DeviceKind::Desktop
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXCLUDED_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_crawler_name() -> String {
    "SumiLens".to_string()
}

fn default_crawler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_database_path() -> String {
    "./sumi-lens.db".to_string()
}

fn default_summary_path() -> String {
    "./sumi-lens-summary.md".to_string()
}

fn default_report_path() -> String {
    "./sumi-lens-report.json".to_string()
}

impl DeviceSection {
    /// Resolves the configured preset into a concrete profile
    pub fn resolve(&self) -> DeviceProfile {
        match self.profile {
            DeviceKind::Desktop => DeviceProfile::desktop(),
            DeviceKind::Mobile => DeviceProfile::mobile(),
            DeviceKind::Custom => DeviceProfile::custom(self.viewport_width.unwrap_or(1080)),
        }
    }
}

impl Config {
    /// Builds the crawl budget handed to the orchestrator
    pub fn crawl_budget(&self) -> CrawlBudget {
        CrawlBudget {
            max_pages: self.crawl.max_pages,
            max_concurrency: self.crawl.max_concurrency,
            device_profile: self.device.resolve(),
            include_screenshots: self.crawl.include_screenshots,
            follow_robots: self.crawl.follow_robots,
            navigation_timeout_ms: self.crawl.navigation_timeout_ms,
            max_retries: self.crawl.max_retries,
            safe_mode: self.crawl.safe_mode,
            scope: self.crawl.scope,
            max_sitemap_links: self.crawl.max_sitemap_links.unwrap_or(self.crawl.max_pages),
        }
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            database_path: PathBuf::from(&self.output.database_path),
            summary_path: PathBuf::from(&self.output.summary_path),
            report_path: PathBuf::from(&self.output.report_path),
        }
    }
}

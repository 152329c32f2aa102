//! Sitemap discovery and parsing
//!
//! Discovery probes a fixed list of well-known locations under the site home
//! and stops at the first reachable one. Parsing understands `urlset` and
//! `sitemapindex` documents; anything else (plain text lists, RSS, Atom) falls
//! back to pulling every `http(s)://` URL out of the text.

use crate::url::site_home;
use crate::ScanError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::OnceLock;
use url::Url;

/// Probed in order; the first reachable location wins
pub const SITEMAP_CANDIDATES: [&str; 16] = [
    "/sitemap.xml",
    "/sitemap/sitemap.xml",
    "/sitemap-index.xml",
    "/sitemap_index.xml",
    "/sitemapindex.xml",
    "/sitemap/index.xml",
    "/sitemap1.xml",
    "/sitemap/",
    "/post-sitemap",
    "/page-sitemap",
    "/sitemap.txt",
    "/sitemap.php",
    "/sitemap.xml.bz2",
    "/sitemap.xml.xz",
    "/sitemap_index.xml.bz2",
    "/sitemap_index.xml.xz",
];

/// Where sitemap documents come from
#[async_trait]
pub trait SitemapSource: Send + Sync {
    /// True if the location answers successfully; errors count as false
    async fn probe(&self, url: &Url) -> bool;

    /// Fetches a sitemap document from a URL or local path
    async fn fetch(&self, location: &str) -> Result<String, ScanError>;
}

/// Sitemap source over HTTP(S) and the local filesystem
#[derive(Debug, Clone)]
pub struct HttpSitemapSource {
    client: Client,
}

impl HttpSitemapSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SitemapSource for HttpSitemapSource {
    async fn probe(&self, url: &Url) -> bool {
        if url.scheme() == "file" {
            return match url.to_file_path() {
                Ok(path) => tokio::fs::metadata(path).await.is_ok(),
                Err(_) => false,
            };
        }

        match self.client.get(url.clone()).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Sitemap probe failed for {}: {}", url, e);
                false
            }
        }
    }

    async fn fetch(&self, location: &str) -> Result<String, ScanError> {
        let invalid = |message: String| ScanError::InvalidSitemap {
            location: location.to_string(),
            message,
        };

        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| invalid(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(invalid(format!("HTTP {}", response.status().as_u16())));
                }
                response.text().await.map_err(|e| invalid(e.to_string()))
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| invalid("not a local path".to_string()))?;
                read_local(&path).await.map_err(|e| invalid(e.to_string()))
            }
            _ => read_local(&PathBuf::from(location))
                .await
                .map_err(|e| invalid(e.to_string())),
        }
    }
}

async fn read_local(path: &PathBuf) -> std::io::Result<String> {
    tokio::fs::read_to_string(path).await
}

/// Result of probing a site for a sitemap
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    Found(Url),
    NotFound,
}

/// Probes well-known sitemap locations
pub struct SitemapDiscoverer<'a> {
    source: &'a dyn SitemapSource,
}

impl<'a> SitemapDiscoverer<'a> {
    pub fn new(source: &'a dyn SitemapSource) -> Self {
        Self { source }
    }

    /// Candidate locations under the seed's site home, in probe order
    pub fn candidates(seed: &Url) -> Vec<Url> {
        let home = site_home(seed);
        SITEMAP_CANDIDATES
            .iter()
            .filter_map(|path| Url::parse(&format!("{}{}", home, path)).ok())
            .collect()
    }

    pub async fn discover(&self, seed: &Url) -> Discovery {
        for candidate in Self::candidates(seed) {
            tracing::debug!("Probing {}", candidate);
            if self.source.probe(&candidate).await {
                tracing::info!("Found sitemap at {}", candidate);
                return Discovery::Found(candidate);
            }
        }

        tracing::info!("No sitemap found for {}", site_home(seed));
        Discovery::NotFound
    }
}

/// A page listed in a sitemap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub url: String,
    /// Unix timestamp of `<lastmod>`, if given
    pub lastmod: Option<i64>,
}

impl SitemapEntry {
    fn new(url: String) -> Self {
        Self { url, lastmod: None }
    }
}

/// Contents of one sitemap document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSitemap {
    pub pages: Vec<SitemapEntry>,
    /// Nested sitemap documents from a `sitemapindex`
    pub children: Vec<String>,
}

/// Parses one sitemap document
///
/// Never fails: unparseable content yields whatever URLs the text fallback
/// can find, possibly none.
pub fn parse_sitemap(content: &str) -> ParsedSitemap {
    let mut parsed = ParsedSitemap::default();
    let mut saw_entities = false;

    for entity in SiteMapReader::new(Cursor::new(content.as_bytes())) {
        match entity {
            SiteMapEntity::Url(entry) => {
                saw_entities = true;
                if let Some(url) = entry.loc.get_url() {
                    parsed.pages.push(SitemapEntry {
                        url: url.to_string(),
                        lastmod: entry.lastmod.get_time().map(|t| t.timestamp()),
                    });
                }
            }
            SiteMapEntity::SiteMap(entry) => {
                saw_entities = true;
                if let Some(url) = entry.loc.get_url() {
                    let url = url.to_string();
                    if is_nested_sitemap(&url) {
                        parsed.children.push(url);
                    } else {
                        parsed.pages.push(SitemapEntry::new(url));
                    }
                }
            }
            // The XML reader does not recover after an error
            SiteMapEntity::Err(_) => break,
        }
    }

    if !saw_entities {
        parsed.pages = extract_text_urls(content)
            .into_iter()
            .map(SitemapEntry::new)
            .collect();
    }

    parsed
}

fn is_nested_sitemap(url: &str) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| url.to_ascii_lowercase());
    path.ends_with(".xml") || path.ends_with(".txt")
}

fn url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).ok())
        .as_ref()
}

/// Every http(s) URL in free text, in order of appearance
pub fn extract_text_urls(content: &str) -> Vec<String> {
    let Some(pattern) = url_pattern() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    pattern
        .find_iter(content)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')', ';']).to_string())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Fetches a sitemap and its nested sitemaps, returning at most `limit` pages
///
/// The root document must be fetchable; failures on nested documents are
/// logged and skipped. Each document is fetched at most once.
pub async fn collect_sitemap_urls(
    source: &dyn SitemapSource,
    location: &str,
    limit: usize,
) -> Result<Vec<SitemapEntry>, ScanError> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut seen_pages: HashSet<String> = HashSet::new();
    let mut pending = vec![location.to_string()];
    let mut entries = Vec::new();
    let mut is_root = true;

    while let Some(current) = pending.pop() {
        if entries.len() >= limit {
            break;
        }
        if !visited.insert(current.clone()) {
            continue;
        }

        let content = match source.fetch(&current).await {
            Ok(content) => content,
            Err(e) if is_root => return Err(e),
            Err(e) => {
                tracing::warn!("Skipping nested sitemap {}: {}", current, e);
                continue;
            }
        };
        is_root = false;

        let parsed = parse_sitemap(&content);
        tracing::debug!(
            "Sitemap {} lists {} pages and {} nested sitemaps",
            current,
            parsed.pages.len(),
            parsed.children.len()
        );

        for entry in parsed.pages {
            if entries.len() >= limit {
                break;
            }
            if seen_pages.insert(entry.url.clone()) {
                entries.push(entry);
            }
        }

        // Reverse so children are fetched in document order
        pending.extend(parsed.children.into_iter().rev());
    }

    Ok(entries)
}

/// Orders entries by closeness to the requested URL, then newest first
///
/// Exact match ranks 2, a URL under the requested one ranks 1, anything
/// else 0. The sort is stable.
pub fn rank_by_closeness(entries: &mut [SitemapEntry], requested: &Url) {
    let target = requested.as_str().trim_end_matches('/');
    let closeness = |url: &str| {
        let url = url.trim_end_matches('/');
        if url == target {
            2
        } else if url.starts_with(target) {
            1
        } else {
            0
        }
    };

    entries.sort_by(|a, b| {
        closeness(&b.url)
            .cmp(&closeness(&a.url))
            .then_with(|| b.lastmod.cmp(&a.lastmod))
    });
}

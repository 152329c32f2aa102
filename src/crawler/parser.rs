//! Link extraction from DOM snapshots
//!
//! # Link Extraction Rules
//!
//! **Include:**
//! - `<a href="...">` tags anywhere in the document
//! - `<link rel="canonical" href="...">`
//!
//! **Exclude:**
//! - `<a href="..." download>`
//! - `javascript:`, `mailto:`, `tel:` links and data URIs
//! - Fragment-only links
//! - Anything that does not resolve to `http`, `https` or `file`
//!
//! `rel="nofollow"` links are followed.

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Link-extraction collaborator
pub trait LinkExtractor: Send + Sync {
    /// Returns absolute URLs found in the DOM, in document order, without repeats
    fn extract_links(&self, dom: &str, base_url: &Url) -> Vec<Url>;
}

/// scraper-backed extractor for served HTML
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlLinkExtractor;

impl LinkExtractor for HtmlLinkExtractor {
    fn extract_links(&self, dom: &str, base_url: &Url) -> Vec<Url> {
        let document = Html::parse_document(dom);
        let base = document_base(&document, base_url);

        let mut seen = HashSet::new();
        let mut links = Vec::new();
        let mut push = |href: &str| {
            if let Some(url) = resolve_link(href, &base) {
                if seen.insert(url.to_string()) {
                    links.push(url);
                }
            }
        };

        if let Ok(a_selector) = Selector::parse("a[href]") {
            for element in document.select(&a_selector) {
                if element.value().attr("download").is_some() {
                    continue;
                }
                if let Some(href) = element.value().attr("href") {
                    push(href);
                }
            }
        }

        if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
            for element in document.select(&canonical_selector) {
                if let Some(href) = element.value().attr("href") {
                    push(href);
                }
            }
        }

        links
    }
}

/// Honours `<base href>` when present
fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| page_url.clone())
}

/// Extracts the page title, used for log lines
pub fn extract_title(dom: &str) -> Option<String> {
    let document = Html::parse_document(dom);
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" | "file" => Some(absolute),
        _ => None,
    }
}

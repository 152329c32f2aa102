//! Politeness filter applied before a URL reaches the frontier

use crate::config::Config;
use crate::frontier::RejectReason;
use crate::robots::{fetch_robots, ParsedRobots, RobotsCache};
use crate::url::{path_extension, BlacklistPatterns};
use crate::ConfigError;
use reqwest::Client;
use std::collections::HashSet;
use url::Url;

/// Robots, blacklist and file-type rules
#[derive(Debug)]
pub struct PoliteFilter {
    blacklist: BlacklistPatterns,
    excluded_extensions: HashSet<String>,
    follow_robots: bool,
    robots: RobotsCache,
    /// Product token matched against robots.txt user-agent groups
    robots_agent: String,
}

impl PoliteFilter {
    pub fn new(
        blacklist: BlacklistPatterns,
        excluded_extensions: impl IntoIterator<Item = String>,
        follow_robots: bool,
        robots_agent: impl Into<String>,
    ) -> Self {
        Self {
            blacklist,
            excluded_extensions: excluded_extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            follow_robots,
            robots: RobotsCache::new(),
            robots_agent: robots_agent.into(),
        }
    }

    /// Builds the filter from validated configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(
            BlacklistPatterns::compile(&config.filters.blacklist)?,
            config.filters.excluded_extensions.clone(),
            config.crawl.follow_robots,
            config.user_agent.crawler_name.clone(),
        ))
    }

    /// A filter that admits everything
    pub fn permissive() -> Self {
        Self::new(BlacklistPatterns::default(), Vec::new(), false, "*")
    }

    /// Fetches robots.txt for the URL's origin unless already cached
    pub async fn load_robots(&self, client: &Client, url: &Url) {
        if !self.follow_robots || !is_http(url) {
            return;
        }

        let origin = origin_key(url);
        if self.robots.contains(&origin) {
            return;
        }

        let robots = fetch_robots(client, &origin).await;
        self.robots.insert(&origin, robots);
    }

    /// Installs robots rules for an origin directly
    pub fn set_robots(&self, url: &Url, robots: ParsedRobots) {
        self.robots.insert(&origin_key(url), robots);
    }

    /// Returns why a URL must not be admitted, or None if it may be
    pub fn evaluate(&self, url: &Url) -> Option<RejectReason> {
        if let Some(pattern) = self.blacklist.matching_pattern(url) {
            return Some(RejectReason::Blacklisted(pattern));
        }

        if let Some(ext) = path_extension(url) {
            if self.excluded_extensions.contains(&ext) {
                return Some(RejectReason::FileType(ext));
            }
        }

        if self.follow_robots
            && is_http(url)
            && !self
                .robots
                .is_allowed(&origin_key(url), url.as_str(), &self.robots_agent)
        {
            return Some(RejectReason::Robots);
        }

        None
    }
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(blacklist: &[&str], follow_robots: bool) -> PoliteFilter {
        let patterns: Vec<String> = blacklist.iter().map(|s| s.to_string()).collect();
        PoliteFilter::new(
            BlacklistPatterns::compile(&patterns).unwrap(),
            vec!["png".to_string(), ".PDF".to_string()],
            follow_robots,
            "SumiLens",
        )
    }

    #[test]
    fn test_plain_page_admitted() {
        let f = filter(&[], false);
        let url = Url::parse("https://example.com/about").unwrap();
        assert_eq!(f.evaluate(&url), None);
    }

    #[test]
    fn test_blacklist_rejects() {
        let f = filter(&["logout"], false);
        let url = Url::parse("https://example.com/logout").unwrap();
        assert!(matches!(
            f.evaluate(&url),
            Some(RejectReason::Blacklisted(_))
        ));
    }

    #[test]
    fn test_file_type_rejects_case_insensitively() {
        let f = filter(&[], false);
        let png = Url::parse("https://example.com/logo.PNG").unwrap();
        let pdf = Url::parse("https://example.com/report.pdf").unwrap();
        assert_eq!(
            f.evaluate(&png),
            Some(RejectReason::FileType("png".to_string()))
        );
        assert_eq!(
            f.evaluate(&pdf),
            Some(RejectReason::FileType("pdf".to_string()))
        );
    }

    #[test]
    fn test_robots_rules_applied_when_following() {
        let f = filter(&[], true);
        let root = Url::parse("https://example.com/").unwrap();
        f.set_robots(
            &root,
            ParsedRobots::from_content("User-agent: *\nDisallow: /private\n"),
        );

        let blocked = Url::parse("https://example.com/private/a").unwrap();
        let open = Url::parse("https://example.com/public").unwrap();
        assert_eq!(f.evaluate(&blocked), Some(RejectReason::Robots));
        assert_eq!(f.evaluate(&open), None);
    }

    #[test]
    fn test_robots_ignored_when_not_following() {
        let f = filter(&[], false);
        let root = Url::parse("https://example.com/").unwrap();
        f.set_robots(&root, ParsedRobots::from_content("User-agent: *\nDisallow: /\n"));

        let url = Url::parse("https://example.com/anything").unwrap();
        assert_eq!(f.evaluate(&url), None);
    }

    #[test]
    fn test_permissive() {
        let f = PoliteFilter::permissive();
        let url = Url::parse("https://example.com/image.png").unwrap();
        assert_eq!(f.evaluate(&url), None);
    }
}

//! Per-origin robots.txt cache
//!
//! A scan touches few origins, so entries live for the whole scan.

use crate::robots::ParsedRobots;
use std::collections::HashMap;
use std::sync::RwLock;

/// Robots rules keyed by origin (`scheme://host[:port]`)
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: RwLock<HashMap<String, ParsedRobots>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores rules for an origin, replacing any previous entry
    pub fn insert(&self, origin: &str, robots: ParsedRobots) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(origin.to_string(), robots);
        }
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(origin))
            .unwrap_or(false)
    }

    /// Checks a URL against the cached rules of its origin
    ///
    /// Origins without an entry are allowed.
    pub fn is_allowed(&self, origin: &str, url: &str, user_agent: &str) -> bool {
        match self.entries.read() {
            Ok(entries) => entries
                .get(origin)
                .map(|robots| robots.is_allowed(url, user_agent))
                .unwrap_or(true),
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_origin_allowed() {
        let cache = RobotsCache::new();
        assert!(cache.is_allowed("https://example.com", "https://example.com/x", "SumiLens"));
        assert!(!cache.contains("https://example.com"));
    }

    #[test]
    fn test_cached_rules_applied() {
        let cache = RobotsCache::new();
        cache.insert(
            "https://example.com",
            ParsedRobots::from_content("User-agent: *\nDisallow: /secret\n"),
        );

        assert!(cache.contains("https://example.com"));
        assert!(!cache.is_allowed(
            "https://example.com",
            "https://example.com/secret",
            "SumiLens"
        ));
        assert!(cache.is_allowed(
            "https://example.com",
            "https://example.com/open",
            "SumiLens"
        ));
    }
}

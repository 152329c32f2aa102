//! Robots.txt parser implementation
//!
//! Thin wrapper around the robotstxt crate's matcher.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    allow_all: bool,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used when robots.txt is missing, unreachable, or robots are ignored.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Returns true if this instance allows every URL
    pub fn is_permissive(&self) -> bool {
        self.allow_all || self.content.trim().is_empty()
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to check
    /// * `user_agent` - The product token (e.g. "SumiLens")
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.is_permissive() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("https://example.com/anything", "SumiLens"));
        assert!(robots.is_permissive());
    }

    #[test]
    fn test_empty_content_allows() {
        let robots = ParsedRobots::from_content("");
        assert!(robots.is_allowed("https://example.com/", "SumiLens"));
    }

    #[test]
    fn test_wildcard_disallow() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /private\n");
        assert!(!robots.is_allowed("https://example.com/private/page", "SumiLens"));
        assert!(robots.is_allowed("https://example.com/public", "SumiLens"));
    }

    #[test]
    fn test_allow_overrides_disallow() {
        let robots = ParsedRobots::from_content(
            "User-agent: *\nDisallow: /docs\nAllow: /docs/public\n",
        );
        assert!(robots.is_allowed("https://example.com/docs/public/intro", "SumiLens"));
        assert!(!robots.is_allowed("https://example.com/docs/internal", "SumiLens"));
    }

    #[test]
    fn test_disallow_everything() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /\n");
        assert!(!robots.is_allowed("https://example.com/", "SumiLens"));
    }
}

use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Compiled blacklist patterns
///
/// A pattern that starts with `http` must equal the full URL. Any other
/// pattern is a regex tested against the host name and against the full URL.
#[derive(Debug, Clone, Default)]
pub struct BlacklistPatterns {
    exact: Vec<String>,
    patterns: Vec<Regex>,
}

impl BlacklistPatterns {
    /// Compiles the configured patterns
    ///
    /// # Returns
    ///
    /// * `Err(ConfigError::InvalidPattern)` - A pattern is not a valid regex
    pub fn compile(patterns: &[String]) -> Result<Self, ConfigError> {
        let mut compiled = Self::default();

        for raw in patterns {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }

            if raw.starts_with("http") {
                compiled.exact.push(raw.trim_end_matches('/').to_string());
            } else {
                let regex = Regex::new(raw)
                    .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", raw, e)))?;
                compiled.patterns.push(regex);
            }
        }

        Ok(compiled)
    }

    /// Returns the first pattern that matches, if any
    pub fn matching_pattern(&self, url: &Url) -> Option<String> {
        let full = url.as_str();
        let trimmed = full.trim_end_matches('/');

        if let Some(exact) = self.exact.iter().find(|e| e.as_str() == trimmed) {
            return Some(exact.clone());
        }

        let host = url.host_str().unwrap_or_default();
        self.patterns
            .iter()
            .find(|re| re.is_match(host) || re.is_match(full))
            .map(|re| re.as_str().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.patterns.is_empty()
    }
}

/// Returns the lowercase extension of the last path segment, if any
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_lens::url::path_extension;
///
/// let url = Url::parse("https://example.com/assets/logo.PNG?v=2").unwrap();
/// assert_eq!(path_extension(&url), Some("png".to_string()));
/// ```
pub fn path_extension(url: &Url) -> Option<String> {
    let last_segment = url.path_segments()?.last()?;
    let (stem, ext) = last_segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

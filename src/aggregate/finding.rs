//! Findings, severities and fingerprints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// Rules whose results are bookkeeping from the evaluator, not issues
pub const IGNORED_RULES: &[&str] = &["frame-tested"];

/// Impact level reported by the rule evaluator
///
/// Variants are ordered from least to most severe so `max` picks the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Serious,
    Critical,
}

impl Severity {
    /// Most severe first
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::Serious,
        Severity::Moderate,
        Severity::Minor,
    ];

    /// Returns the pass/fail bucket this severity counts towards
    pub fn bucket(&self) -> SeverityBucket {
        match self {
            Self::Critical | Self::Serious => SeverityBucket::MustFix,
            Self::Moderate | Self::Minor => SeverityBucket::GoodToFix,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Serious => "serious",
            Self::Moderate => "moderate",
            Self::Minor => "minor",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Self::Critical),
            "serious" => Some(Self::Serious),
            "moderate" => Some(Self::Moderate),
            "minor" => Some(Self::Minor),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Higher-level grouping used by threshold checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeverityBucket {
    #[serde(rename = "mustFix")]
    MustFix,
    #[serde(rename = "goodToFix")]
    GoodToFix,
}

impl fmt::Display for SeverityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MustFix => f.write_str("mustFix"),
            Self::GoodToFix => f.write_str("goodToFix"),
        }
    }
}

/// A single raw result from the rule evaluator
///
/// Deserializes from the evaluator's JSON output; `impact`, `html` and `tags`
/// are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(alias = "rule_id", alias = "id")]
    pub rule_id: String,

    #[serde(alias = "impact")]
    pub severity: Severity,

    #[serde(default, alias = "wcag_tags", alias = "tags")]
    pub wcag_tags: BTreeSet<String>,

    #[serde(alias = "html_snippet", alias = "html")]
    pub html_snippet: String,

    #[serde(default, alias = "help_url")]
    pub help_url: String,

    /// Filled in by the scheduler when the evaluator leaves it empty
    #[serde(default, alias = "page_url")]
    pub page_url: String,

    #[serde(default)]
    pub description: Option<String>,
}

impl Finding {
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.rule_id, &self.html_snippet)
    }

    /// Tags that name a conformance level or best practice
    pub fn conformance_tags(&self) -> BTreeSet<String> {
        self.wcag_tags
            .iter()
            .filter(|tag| tag.starts_with("wcag") || tag.as_str() == "best-practice")
            .cloned()
            .collect()
    }

    pub fn is_ignored(&self) -> bool {
        IGNORED_RULES.contains(&self.rule_id.as_str())
    }
}

/// Collapses whitespace runs so formatting differences do not split issues
pub fn normalize_snippet(snippet: &str) -> String {
    snippet.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable identity of "the same issue": SHA-256 over rule id and normalized snippet
pub fn fingerprint(rule_id: &str, html_snippet: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_snippet(html_snippet).as_bytes());
    hex::encode(hasher.finalize())
}

/// How a page visit ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VisitStatus {
    Http { status: u16 },
    NavigationError { message: String },
}

/// Outcome of visiting one page, consumed once by the aggregator
#[derive(Debug, Clone)]
pub struct PageVisitResult {
    pub url: String,
    pub status: VisitStatus,
    pub findings: Vec<Finding>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PageVisitResult {
    pub fn http_status(&self) -> Option<u16> {
        match self.status {
            VisitStatus::Http { status } => Some(status),
            VisitStatus::NavigationError { .. } => None,
        }
    }
}

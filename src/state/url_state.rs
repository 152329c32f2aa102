/// URL state definitions for tracking scan progress
///
/// Every URL admitted to the frontier moves through
/// `Queued -> InProgress -> {Scanned | Failed | Excluded}`, or goes straight
/// to `Excluded` when the politeness filter rejects it at admission.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a URL in the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlState {
    // ===== Active States =====
    /// Waiting to be handed to a worker
    Queued,

    /// A worker is visiting the page
    InProgress,

    // ===== Terminal States =====
    /// Page was rendered and evaluated
    Scanned,

    /// Navigation failed after retries, or the server answered with an error status
    Failed,

    /// Never visited: filtered by robots, blacklist, file type, content type or scope
    Excluded,
}

impl UrlState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Scanned | Self::Failed | Self::Excluded)
    }

    /// Returns true if the URL may still be visited
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::InProgress)
    }

    /// Checks whether moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: UrlState) -> bool {
        match (self, next) {
            (Self::Queued, Self::InProgress) => true,
            (Self::InProgress, Self::Scanned | Self::Failed | Self::Excluded) => true,
            _ => false,
        }
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Scanned => "scanned",
            Self::Failed => "failed",
            Self::Excluded => "excluded",
        }
    }

    /// Parses a state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "in_progress" => Some(Self::InProgress),
            "scanned" => Some(Self::Scanned),
            "failed" => Some(Self::Failed),
            "excluded" => Some(Self::Excluded),
            _ => None,
        }
    }

    /// Returns all possible states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Queued,
            Self::InProgress,
            Self::Scanned,
            Self::Failed,
            Self::Excluded,
        ]
    }
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Where a URL was first discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    Seed,
    Sitemap,
    Domain,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Sitemap => "sitemap",
            Self::Domain => "domain",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "seed" => Some(Self::Seed),
            "sitemap" => Some(Self::Sitemap),
            "domain" => Some(Self::Domain),
            _ => None,
        }
    }
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

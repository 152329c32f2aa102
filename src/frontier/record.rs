use crate::state::{DiscoverySource, UrlState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A URL tracked by the frontier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlRecord {
    pub canonical_url: String,
    pub state: UrlState,
    pub discovered_from: DiscoverySource,
    /// Navigation attempts made so far
    pub attempts: u32,
    /// Admission sequence number
    pub discovered_order: u64,
    /// Failure diagnostic or exclusion reason
    pub detail: Option<String>,
    pub http_status: Option<u16>,
}

/// Why a URL was turned away at admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Could not be canonicalized
    Invalid(String),
    /// Matched a blacklist pattern
    Blacklisted(String),
    /// Excluded file extension
    FileType(String),
    /// Disallowed by robots.txt
    Robots,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(err) => write!(f, "invalid url: {}", err),
            Self::Blacklisted(pattern) => write!(f, "blacklisted by '{}'", pattern),
            Self::FileType(ext) => write!(f, "excluded file type .{}", ext),
            Self::Robots => f.write_str("disallowed by robots.txt"),
        }
    }
}

/// Result of offering a URL to the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitResult {
    /// Queued under this canonical URL
    Admitted(String),
    /// Already known; counted and ignored
    Duplicate,
    Rejected(RejectReason),
}

impl AdmitResult {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }
}

/// Final outcome of a dispatched URL, reported by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitOutcome {
    Scanned {
        http_status: Option<u16>,
    },
    Failed {
        reason: String,
        http_status: Option<u16>,
    },
    Excluded {
        reason: String,
    },
}

impl VisitOutcome {
    pub fn target_state(&self) -> UrlState {
        match self {
            Self::Scanned { .. } => UrlState::Scanned,
            Self::Failed { .. } => UrlState::Failed,
            Self::Excluded { .. } => UrlState::Excluded,
        }
    }
}

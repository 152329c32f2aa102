//! State module for tracking scan progress
//!
//! # Components
//!
//! - `UrlState`: lifecycle of a URL inside the frontier
//! - `DiscoverySource`: where a URL was first seen
//! - `ScanSession`: live aggregate root shared by all crawl phases
//! - `ScanReport`: the finished, serializable session

mod session;
mod url_state;

// Re-export main types
pub use session::{
    PageRecord, ScanReport, ScanSession, StrategyUsed, UrlWithReason, UrlsCrawled,
};
pub use url_state::{DiscoverySource, UrlState};

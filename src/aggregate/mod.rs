//! Result aggregation and threshold monitoring
//!
//! Raw findings from the rule evaluator are merged into one issue per
//! fingerprint, counted by severity, and checked against pass/fail limits
//! after every page.

mod aggregator;
mod finding;
mod threshold;

pub use aggregator::{
    sort_issues, top_pages, AggregatedIssue, MergeOutcome, Occurrence, ResultAggregator,
    SeverityCounts,
};
pub use finding::{
    fingerprint, normalize_snippet, Finding, PageVisitResult, Severity, SeverityBucket,
    VisitStatus, IGNORED_RULES,
};
pub use threshold::{AbortReason, ThresholdMonitor, ThresholdStatus};

//! Pass/fail thresholds over cumulative severity counts

use crate::aggregate::aggregator::SeverityCounts;
use crate::aggregate::finding::SeverityBucket;
use crate::config::ThresholdConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Why a scan was stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortReason {
    pub bucket: SeverityBucket,
    pub count: u64,
    pub limit: u64,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} occurrences found: {} > {}",
            self.bucket, self.count, self.limit
        )
    }
}

/// Result of a threshold check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdStatus {
    WithinLimits,
    /// This check raised the abort signal
    Triggered(AbortReason),
    /// The signal was raised by an earlier check
    AlreadyAborted(AbortReason),
}

impl ThresholdStatus {
    pub fn is_aborted(&self) -> bool {
        !matches!(self, Self::WithinLimits)
    }
}

/// Watches bucket counts and raises a one-shot abort signal
#[derive(Debug)]
pub struct ThresholdMonitor {
    limits: ThresholdConfig,
    aborted: AtomicBool,
    reason: Mutex<Option<AbortReason>>,
}

impl ThresholdMonitor {
    pub fn new(limits: ThresholdConfig) -> Self {
        Self {
            limits,
            aborted: AtomicBool::new(false),
            reason: Mutex::new(None),
        }
    }

    /// A monitor with no limits never aborts
    pub fn unlimited() -> Self {
        Self::new(ThresholdConfig::default())
    }

    pub fn limits(&self) -> ThresholdConfig {
        self.limits
    }

    /// Compares counts against the limits; call once per merge
    ///
    /// A bucket aborts when its count is strictly greater than its limit.
    /// mustFix is checked before goodToFix. Only the first exceeding check
    /// returns `Triggered`.
    pub fn check(&self, counts: &SeverityCounts) -> ThresholdStatus {
        let mut slot = match self.reason.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(reason) = *slot {
            return ThresholdStatus::AlreadyAborted(reason);
        }

        match self.exceeded(counts) {
            Some(reason) => {
                *slot = Some(reason);
                self.aborted.store(true, Ordering::SeqCst);
                tracing::warn!("Threshold exceeded, aborting scan: {}", reason);
                ThresholdStatus::Triggered(reason)
            }
            None => ThresholdStatus::WithinLimits,
        }
    }

    fn exceeded(&self, counts: &SeverityCounts) -> Option<AbortReason> {
        let buckets = [
            (SeverityBucket::MustFix, counts.must_fix(), self.limits.must_fix),
            (
                SeverityBucket::GoodToFix,
                counts.good_to_fix(),
                self.limits.good_to_fix,
            ),
        ];

        buckets.into_iter().find_map(|(bucket, count, limit)| match limit {
            Some(limit) if count > limit => Some(AbortReason {
                bucket,
                count,
                limit,
            }),
            _ => None,
        })
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self.reason.lock() {
            Ok(slot) => *slot,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

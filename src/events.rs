//! Progress events published while a scan runs
//!
//! Publishing never blocks a worker: events are dropped when nobody is
//! subscribed, and slow subscribers see `RecvError::Lagged`.

use crate::aggregate::AbortReason;
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// Crawl phase announced by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    SitemapDiscovery,
    SitemapCrawl,
    DomainCrawl,
    LocalFile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ScanEvent {
    PhaseStarted {
        phase: Phase,
    },
    Scanned {
        url: String,
        order: u64,
        findings: u64,
        new_issues: u64,
    },
    Skipped {
        url: String,
        reason: String,
    },
    Failed {
        url: String,
        reason: String,
    },
    Duplicate {
        url: String,
    },
    Aborted {
        reason: AbortReason,
    },
    Completed {
        scanned: usize,
        issues: usize,
    },
}

/// Broadcast fan-out of [`ScanEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ScanEvent) {
        // Err only means there are no receivers
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

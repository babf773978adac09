//! Reconciliation of the durable backlog against the ingestion endpoint.
//!
//! One pass re-sends every queued event in order and then performs a single
//! compaction, so the store is rewritten at most once per pass whatever the
//! backlog size.

use crate::forward::{Forwarder, Outcome};
use crate::queue::{DurableQueue, QueueError};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Why a pass was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    AfterDelivery,
    LinkUp,
    Interval,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Startup => "startup",
            Trigger::AfterDelivery => "after_delivery",
            Trigger::LinkUp => "link_up",
            Trigger::Interval => "interval",
            Trigger::Manual => "manual",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub attempted: usize,
    pub delivered: usize,
    pub rejected: usize,
    pub transport_failed: usize,
    /// Records left in the store after compaction, including any appended
    /// while the pass was running
    pub remaining: usize,
}

impl PassReport {
    pub fn is_drained(&self) -> bool {
        self.remaining == 0
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted {}, delivered {}, rejected {}, transport failures {}, remaining {}",
            self.attempted, self.delivered, self.rejected, self.transport_failed, self.remaining
        )
    }
}

/// Runs one reconciliation pass.
///
/// A read failure aborts the pass before anything is sent and leaves the
/// store untouched; callers log it and try again on the next trigger.
pub async fn run_pass<F: Forwarder>(
    queue: &DurableQueue,
    forwarder: &F,
    trigger: Trigger,
) -> Result<PassReport, QueueError> {
    let backlog = queue.snapshot().await?;
    if backlog.is_empty() {
        debug!(%trigger, "No offline backlog");
        return Ok(PassReport::default());
    }

    let start_time = Instant::now();
    info!(
        %trigger,
        "Found {} offline entries. Uploading...",
        backlog.entries.len()
    );

    let mut report = PassReport {
        attempted: backlog.entries.len(),
        ..Default::default()
    };
    let mut still_failing = Vec::new();

    for entry in backlog.entries {
        match forwarder.send(&entry.event).await {
            Outcome::Delivered => {
                report.delivered += 1;
                debug!(seq = entry.seq, card_id = %entry.event.card_id, "Synced");
            }
            Outcome::Rejected { .. } => {
                report.rejected += 1;
                still_failing.push(entry);
            }
            Outcome::TransportFailed(_) => {
                report.transport_failed += 1;
                still_failing.push(entry);
            }
        }
    }

    report.remaining = queue.commit_pass(backlog.horizon, &still_failing).await?;

    if still_failing.is_empty() {
        info!(%trigger, "All offline data synced in {:?}", start_time.elapsed());
    } else {
        warn!(
            %trigger,
            "{} entries failed to sync. Keeping them.",
            still_failing.len()
        );
    }
    debug!(%trigger, "Pass finished: {}", report);

    Ok(report)
}

use super::link::{LinkState, LinkWatch};
use super::source::{EventSource, SourceError};
use super::state::DeviceState;
use crate::event::{CardUid, ScanEvent};
use crate::forward::{Forwarder, Outcome};
use crate::queue::{AppendReceipt, DurableQueue, QueueError};
use crate::reconcile::{run_pass, PassReport, Trigger};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub location_id: String,
    /// How often a non-empty backlog is retried while the link is up
    pub reconcile_interval: Duration,
    /// Repeated reads of the same card within this window are ignored
    pub scan_debounce: Duration,
}

/// What happened to one captured scan
#[derive(Debug)]
pub enum Dispatch {
    Delivered,
    /// Persisted for a later pass. `outcome` is the failed live attempt, if
    /// one was made.
    Queued {
        outcome: Option<Outcome>,
        receipt: AppendReceipt,
    },
    /// Neither delivered nor persisted
    Lost(QueueError),
}

pub struct DeviceController<F> {
    forwarder: F,
    queue: DurableQueue,
    link: LinkWatch,
    last_link: LinkState,
    settings: ControllerSettings,
    state: DeviceState,
    last_scan: Option<(CardUid, Instant)>,
}

impl<F: Forwarder> DeviceController<F> {
    pub fn new(
        forwarder: F,
        queue: DurableQueue,
        link: LinkWatch,
        settings: ControllerSettings,
    ) -> Self {
        let last_link = link.current();
        DeviceController {
            forwarder,
            queue,
            link,
            last_link,
            settings,
            state: DeviceState::Disconnected,
            last_scan: None,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    fn set_state(&mut self, next: DeviceState) {
        if self.state != next {
            debug!("Device state {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn idle_state(&self) -> DeviceState {
        if self.link.is_linked() {
            DeviceState::Ready
        } else {
            DeviceState::Connecting
        }
    }

    /// Runs a reconciliation pass. A store read failure is logged and the
    /// pass skipped; nothing is deleted.
    pub async fn reconcile(&mut self, trigger: Trigger) -> Option<PassReport> {
        match run_pass(&self.queue, &self.forwarder, trigger).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(
                    %trigger,
                    category = e.category(),
                    "Skipping reconciliation: {}",
                    e
                );
                None
            }
        }
    }

    /// Live-sends one capture, or queues it when the link is down or the
    /// send fails. A successful send also drains the backlog.
    pub async fn dispatch(&mut self, card_id: CardUid) -> Dispatch {
        let event = ScanEvent::new(self.settings.location_id.clone(), card_id);

        if !self.link.is_linked() {
            info!(%card_id, "Link down, saving locally");
            let result = self.enqueue(event, None).await;
            self.set_state(self.idle_state());
            return result;
        }

        self.set_state(DeviceState::Dispatching);
        info!(%card_id, "Uploading");
        let outcome = self.forwarder.send(&event).await;

        let result = if outcome.is_delivered() {
            info!(%card_id, "Upload success");
            self.reconcile(Trigger::AfterDelivery).await;
            Dispatch::Delivered
        } else {
            warn!(%card_id, outcome = outcome.label(), "{}. Saving locally.", outcome);
            self.enqueue(event, Some(outcome)).await
        };

        self.set_state(self.idle_state());
        result
    }

    async fn enqueue(&mut self, event: ScanEvent, outcome: Option<Outcome>) -> Dispatch {
        match self.queue.append(event.clone()).await {
            Ok(receipt) => {
                for dropped in &receipt.evicted {
                    error!(
                        card_id = %dropped.event.card_id,
                        seq = dropped.seq,
                        category = "capacity_eviction",
                        "Dropped queued event: offline store at capacity ({})",
                        self.queue.capacity()
                    );
                }
                Dispatch::Queued { outcome, receipt }
            }
            Err(e) => {
                error!(
                    card_id = %event.card_id,
                    location = %event.location_id,
                    category = e.category(),
                    "EVENT LOST: could not persist scan: {}",
                    e
                );
                Dispatch::Lost(e)
            }
        }
    }

    /// Records an observed link value and reconciles on an unlinked to
    /// linked edge.
    pub async fn on_link_observed(&mut self, now: LinkState) -> Option<PassReport> {
        let previous = std::mem::replace(&mut self.last_link, now);
        if self.state != DeviceState::Dispatching {
            self.set_state(self.idle_state());
        }

        match (previous, now) {
            (LinkState::Unlinked, LinkState::Linked) => {
                info!("Link restored");
                self.reconcile(Trigger::LinkUp).await
            }
            (LinkState::Linked, LinkState::Unlinked) => {
                warn!("Link lost, new scans will be saved locally");
                None
            }
            _ => None,
        }
    }

    fn debounced(&mut self, card_id: CardUid, now: Instant) -> bool {
        if let Some((last, at)) = self.last_scan {
            if last == card_id && now.saturating_duration_since(at) < self.settings.scan_debounce {
                return true;
            }
        }
        self.last_scan = Some((card_id, now));
        false
    }

    /// Dispatches a read unless it repeats the previous card inside the
    /// debounce window.
    pub async fn handle_scan(&mut self, card_id: CardUid, now: Instant) -> Option<Dispatch> {
        if self.debounced(card_id, now) {
            debug!(%card_id, "Ignoring repeated read");
            return None;
        }
        info!(%card_id, "Read");
        Some(self.dispatch(card_id).await)
    }

    /// Drives capture and reconciliation until the source ends or `shutdown`
    /// fires. Only a failing event source ends the loop with an error.
    pub async fn run<S: EventSource>(
        mut self,
        mut source: S,
        shutdown: CancellationToken,
    ) -> Result<(), SourceError> {
        self.set_state(DeviceState::Connecting);
        self.last_link = self.link.current();
        self.set_state(self.idle_state());

        if self.link.is_linked() {
            self.reconcile(Trigger::Startup).await;
        }
        info!("Ready. Scan card.");

        let mut ticker = tokio::time::interval(self.settings.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut link_open = true;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down device loop");
                    break;
                }
                changed = self.link.changed(), if link_open => match changed {
                    Some(now) => {
                        self.on_link_observed(now).await;
                    }
                    None => {
                        warn!("Connectivity monitor stopped, link state frozen at {}", self.last_link);
                        link_open = false;
                    }
                },
                scan = source.next_scan() => match scan? {
                    Some(card_id) => {
                        self.handle_scan(card_id, Instant::now()).await;
                    }
                    None => {
                        info!("Event source closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if self.link.is_linked() && !self.queue.is_empty().await {
                        self.reconcile(Trigger::Interval).await;
                    }
                }
            }
        }

        Ok(())
    }
}

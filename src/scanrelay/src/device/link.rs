use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unlinked,
    Linked,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Unlinked => f.write_str("unlinked"),
            LinkState::Linked => f.write_str("linked"),
        }
    }
}

/// Writable connectivity value, owned by whatever manages network association.
#[derive(Clone, Debug)]
pub struct ConnectivityState {
    tx: Arc<watch::Sender<LinkState>>,
}

impl ConnectivityState {
    pub fn new(initial: LinkState) -> Self {
        let (tx, _) = watch::channel(initial);
        ConnectivityState { tx: Arc::new(tx) }
    }

    /// Publishes `next`; returns whether the value changed.
    pub fn set(&self, next: LinkState) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }

    pub fn current(&self) -> LinkState {
        *self.tx.borrow()
    }

    /// Read-only view for the forwarding core
    pub fn subscribe(&self) -> LinkWatch {
        LinkWatch {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only, change-notifying view of [`ConnectivityState`]
#[derive(Clone, Debug)]
pub struct LinkWatch {
    rx: watch::Receiver<LinkState>,
}

impl LinkWatch {
    pub fn current(&self) -> LinkState {
        *self.rx.borrow()
    }

    pub fn is_linked(&self) -> bool {
        self.current() == LinkState::Linked
    }

    /// Waits for the next published change. `None` once the owner is gone.
    pub async fn changed(&mut self) -> Option<LinkState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

/// Connectivity collaborator for hosts where association is handled by the
/// OS: the link counts as up while a TCP connection to the endpoint opens.
#[derive(Debug)]
pub struct LinkProbe {
    target: String,
    interval: Duration,
    timeout: Duration,
    state: ConnectivityState,
}

impl LinkProbe {
    pub fn for_endpoint(
        endpoint: &Url,
        interval: Duration,
        timeout: Duration,
        state: ConnectivityState,
    ) -> Result<Self> {
        let host = endpoint
            .host_str()
            .with_context(|| format!("endpoint {} has no host", endpoint))?;
        let port = endpoint
            .port_or_known_default()
            .with_context(|| format!("endpoint {} has no port", endpoint))?;
        // IPv6 literals keep their brackets in host_str
        Ok(LinkProbe {
            target: format!("{}:{}", host, port),
            interval,
            timeout,
            state,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub async fn probe_once(&self) -> LinkState {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(_)) => LinkState::Linked,
            Ok(Err(e)) => {
                debug!("Link probe to {} failed: {}", self.target, e);
                LinkState::Unlinked
            }
            Err(_) => {
                debug!("Link probe to {} timed out", self.target);
                LinkState::Unlinked
            }
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let next = self.probe_once().await;
                    if self.state.set(next) {
                        info!("Link to {} is now {}", self.target, next);
                    }
                }
            }
        }
    }
}

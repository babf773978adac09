//! Live delivery of scan events to the ingestion endpoint
//!
//! A [`Forwarder`] makes exactly one delivery attempt per call and classifies
//! the result as an [`Outcome`]. It never retries and never touches the
//! durable queue; retry policy belongs to the reconciliation pass.
//!
//! # Example
//!
//! ```rust,no_run
//! # use anyhow::Result;
//! # use std::time::Duration;
//! # use scanrelay::event::ScanEvent;
//! # use scanrelay::forward::{Forwarder, ForwardingClient};
//! #
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let client = ForwardingClient::try_new(
//!     "http://127.0.0.1:5050/log_entry",
//!     Duration::from_secs(10),
//!     Duration::from_secs(5),
//! )?;
//! let event = ScanEvent::new("loc_1", "0x04a1b2c3".parse()?);
//! let outcome = client.send(&event).await;
//! println!("{}", outcome);
//! # Ok(())
//! # }
//! ```

mod client;
mod outcome;

use crate::event::ScanEvent;

pub use client::ForwardingClient;
pub use outcome::{Outcome, TransportError, TransportErrorKind};

#[allow(async_fn_in_trait)]
pub trait Forwarder {
    async fn send(&self, event: &ScanEvent) -> Outcome;
}

impl<F: Forwarder> Forwarder for &F {
    async fn send(&self, event: &ScanEvent) -> Outcome {
        (**self).send(event).await
    }
}

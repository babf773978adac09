//! Durable backlog of events that could not be delivered live
//!
//! The store is a newline-delimited JSON file. Appends go to the tail and are
//! synced before returning; every rewrite (compaction or capacity eviction)
//! is written to a sibling temp file and renamed into place.

mod durable_queue;
mod error;
mod record;

pub use durable_queue::{AppendReceipt, Backlog, DurableQueue};
pub use error::QueueError;
pub use record::QueuedEvent;

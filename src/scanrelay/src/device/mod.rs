//! The device side: card capture, connectivity and the control loop that
//! ties them to live forwarding and the durable backlog.

mod controller;
mod link;
mod source;
mod state;

pub use controller::{ControllerSettings, DeviceController, Dispatch};
pub use link::{ConnectivityState, LinkProbe, LinkState, LinkWatch};
pub use source::{EventSource, LineSource, ReaderSource, SourceError};
pub use state::DeviceState;

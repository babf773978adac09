use std::fmt;

/// Outer state of the capture/dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Loop not started yet
    Disconnected,
    /// Waiting for the association collaborator to report a link
    Connecting,
    Ready,
    /// A live send is in flight
    Dispatching,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Disconnected => "disconnected",
            DeviceState::Connecting => "connecting",
            DeviceState::Ready => "ready",
            DeviceState::Dispatching => "dispatching",
        };
        f.write_str(name)
    }
}

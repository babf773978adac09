pub mod cli;
pub mod config;
pub mod constants;
pub mod device;
pub mod event;
pub mod forward;
pub mod logging;
pub mod queue;
pub mod reconcile;

#[cfg(test)]
mod testutil;

//! High-level driver for device sessions.
//!
//! A [`Session`] tracks the CLI mode of one connected device and runs
//! single commands. The apply machine on top of it pushes configuration
//! batches and unwinds on failure, and [`DeviceDriver`] maps the change
//! lifecycle phases onto both.

mod apply;
mod builder;
pub mod clock;
mod lifecycle;
pub(crate) mod response;
mod session;
#[cfg(test)]
mod sim;

pub use builder::SessionBuilder;
pub use clock::{Clock, TokioClock};
pub use lifecycle::{DeviceDriver, DriverOptions};
pub use response::Response;
pub use session::Session;

use std::fmt;
use std::future::Future;

use crate::error::Result;

/// Phases of a configuration change as driven by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Prepare,
    Commit,
    Abort,
    Revert,
    Persist,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Prepare => "prepare",
            Phase::Commit => "commit",
            Phase::Abort => "abort",
            Phase::Revert => "revert",
            Phase::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// The change lifecycle the orchestrator drives a device through.
///
/// Configuration blocks are desired-configuration text in the normalized
/// (device-dump) form. Every phase reports completion or failure to the
/// caller context before returning.
pub trait ChangeLifecycle: Send {
    /// Apply `diff` to the device and stage it.
    fn prepare(&mut self, diff: &str) -> impl Future<Output = Result<()>> + Send;

    /// Acknowledge a prepared change.
    fn commit(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Apply `inverse` after a prepare that the orchestrator abandoned.
    fn abort(&mut self, inverse: &str) -> impl Future<Output = Result<()>> + Send;

    /// Apply `inverse` after a committed change.
    fn revert(&mut self, inverse: &str) -> impl Future<Output = Result<()>> + Send;

    /// Make the running configuration durable.
    fn persist(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Identifier of the device's current configuration state, used to
    /// detect out-of-band changes.
    fn fingerprint(&mut self) -> impl Future<Output = Result<String>> + Send;
}

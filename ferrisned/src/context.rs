//! Hooks into the caller that owns an operation.
//!
//! The orchestrator driving a device (a transaction manager, a CLI, a
//! test) implements [`CallerContext`] to receive trace output, phase
//! results, and requests to extend its own operation deadline.

use std::time::Duration;

use crate::driver::Phase;
use crate::error::Error;

/// Direction of a traced chunk of session text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceDirection {
    /// Text written to the device.
    Sent,
    /// Cleaned text received from the device.
    Received,
}

/// Callbacks from a running operation to its caller.
///
/// Every method has a no-op default.
pub trait CallerContext: Send + Sync {
    /// The operation needs at least `budget` more time before the caller
    /// gives up on it.
    fn extend_timeout(&self, _budget: Duration) {}

    /// Verbose session trace, only called when tracing is enabled.
    fn trace(&self, _direction: TraceDirection, _text: &str) {}

    /// A lifecycle phase finished successfully.
    fn phase_completed(&self, _phase: Phase) {}

    /// A lifecycle phase failed; `error` is what the phase returns.
    fn phase_failed(&self, _phase: Phase, _error: &Error) {}
}

/// Context that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopContext;

impl CallerContext for NoopContext {}

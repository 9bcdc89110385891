//! Host integration for the bioview runtime.
//!
//! The engine never owns an event loop. The host (a desktop shell, a browser
//! bridge, a test harness) implements [`RuntimeScheduler`] and calls
//! [`RuntimeHandle::drain_ui`](crate::RuntimeHandle::drain_ui) when asked.

/// Asks the host to run another UI pass.
///
/// Wakers created by the runtime may fire from any thread, so implementations
/// must be `Send + Sync`.
pub trait RuntimeScheduler: Send + Sync {
    /// Request that the host drain the runtime soon.
    fn schedule_frame(&self);
}

/// Scheduler for hosts that drain on their own cadence.
#[derive(Default)]
pub struct DefaultScheduler;

impl RuntimeScheduler for DefaultScheduler {
    fn schedule_frame(&self) {}
}

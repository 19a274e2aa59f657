//! Lifecycle notification abstraction.

use crate::container::Termination;

/// Receives lifecycle notifications from the orchestrator.
///
/// Installed during boot (handlers may swap in their own); every method has
/// a no-op default so minimal implementations stay minimal.
pub trait LifecycleLogger: Send + Sync {
    /// The container reported its own termination; a stop follows.
    fn stopping(&self, cause: &Termination) {
        let _ = cause;
    }

    /// An external restart request arrived; a restart follows.
    fn restart_requested(&self) {}
}

/// Logger that discards all notifications.
pub struct NopLogger;

impl LifecycleLogger for NopLogger {}

/// Logger that forwards notifications to `tracing`.
pub struct TracingLogger;

impl LifecycleLogger for TracingLogger {
    fn stopping(&self, cause: &Termination) {
        tracing::info!(%cause, "stopping");
    }

    fn restart_requested(&self) {
        tracing::info!("restart requested");
    }
}

//! The runtime container contract.
//!
//! The container is an external collaborator: an opaque object holding the
//! fully assembled set of application services. The orchestrator builds it
//! from the options accumulated on the boot event, starts and stops it
//! under phase deadlines, and watches it for self-termination.

use async_trait::async_trait;

/// Why a container stopped on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// An OS termination signal observed by the container.
    Signal(i32),
    /// A fatal internal error.
    Fault(String),
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Signal(sig) => write!(f, "signal {sig}"),
            Termination::Fault(reason) => write!(f, "fault: {reason}"),
        }
    }
}

/// A runtime container assembled from accumulated boot options.
///
/// The orchestrator holds the only reference; no other component mutates
/// it. Implementations report failures with their own error types through
/// `anyhow`.
#[async_trait]
pub trait Container: Send + Sync + 'static {
    /// The option/provider type accumulated on the boot event.
    type Option: Send + 'static;

    /// Assemble the container from all options collected during boot.
    fn build(options: Vec<Self::Option>) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Start the container's services.
    async fn start(&self) -> anyhow::Result<()>;

    /// Stop the container's services.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Resolves when the container terminates on its own, with the cause.
    async fn wait(&self) -> Termination;
}

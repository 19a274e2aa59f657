//! Error types for keel.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for the framework.
///
/// Chain failures raised by bound handlers surface verbatim; the
/// phase-labelled variants (`Boot`, `Start`, `Stop`, ...) are produced only
/// by the orchestrator's own terminal actions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("boot: no lifecycle logger supplied")]
    MissingLogger,

    #[error("boot: container not assembled (was boot() called?)")]
    NotBooted,

    #[error("boot: {0}")]
    Boot(#[source] anyhow::Error),

    #[error("start: {0}")]
    Start(#[source] anyhow::Error),

    #[error("start: timed out after {0:?}")]
    StartTimeout(Duration),

    #[error("stop: {0}")]
    Stop(#[source] anyhow::Error),

    #[error("stop: timed out after {0:?}")]
    StopTimeout(Duration),

    #[error("restart is not supported on this platform")]
    RestartUnsupported,

    #[error("restart: {0}")]
    Restart(#[source] std::io::Error),

    #[error("signal registration failed: {0}")]
    Signal(#[source] std::io::Error),

    /// Escape hatch for arbitrary handler failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot determine config format of {0}")]
    UnknownFormat(PathBuf),

    #[error("failed to parse config layer: {0}")]
    Parse(String),

    #[error("config layer is not a table/object")]
    NotAnObject,

    #[error("failed to deserialize config: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for the framework.
pub type Result<T> = std::result::Result<T, Error>;

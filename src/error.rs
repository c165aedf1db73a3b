use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for release-train operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Index {index} out of range (0..{len})")]
    Range { index: usize, len: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid parameters for undo action '{action}': {message}")]
    Params { action: String, message: String },

    #[error("No suitable version control backend for '{}'", .path.display())]
    NoSuitableBackend { path: PathBuf },

    #[error("Command `{command}` failed (exit code {}): {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    BackendOperationFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{backend} does not support '{operation}'")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("Aborted by user: {0}")]
    AbortedByUser(String),

    #[error("Unknown release type '{0}', expected one of major, minor, build, revision, preRelease, buildMetaTag")]
    UnknownReleaseType(String),

    #[error("Unknown undo action '{0}'")]
    UnknownUndoAction(String),

    #[error("Interrupted, release rolled back")]
    Interrupted,

    #[error("Invalid release state: {0}")]
    InvalidState(String),

    #[error("Cannot acquire version from tags, no tags yet")]
    NoTags,

    #[error("Version '{0}' is already tagged")]
    AlreadyTagged(String),

    #[error("Nothing to release:\n{0}")]
    NothingToRelease(String),

    #[error("There were errors while undoing release:\n{}", .errors.iter().map(|e| format!(" - {}", e)).collect::<Vec<_>>().join("\n"))]
    Rollback { errors: Vec<String> },

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Convenience type alias for Results in release-train
pub type Result<T> = std::result::Result<T, ReleaseError>;

impl ReleaseError {
    pub fn parse(msg: impl Into<String>) -> Self {
        ReleaseError::Parse(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        ReleaseError::InvalidArgument(msg.into())
    }

    pub fn params(action: impl Into<String>, msg: impl Into<String>) -> Self {
        ReleaseError::Params {
            action: action.into(),
            message: msg.into(),
        }
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        ReleaseError::AbortedByUser(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        ReleaseError::InvalidState(msg.into())
    }

    pub fn manifest(msg: impl Into<String>) -> Self {
        ReleaseError::Manifest(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ReleaseError::Config(msg.into())
    }

    /// Whether this error came from a declined confirmation gate
    pub fn is_abort(&self) -> bool {
        matches!(self, ReleaseError::AbortedByUser(_))
    }
}

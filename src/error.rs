//! Error types for Fetchwarden

use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Repository not found at: {0}")]
    RepositoryUnavailable(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Fetch already in progress for {0}")]
    AlreadyInProgress(String),

    #[error("Fetch scheduler has stopped")]
    SchedulerStopped,

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl WardenError {
    /// Stable machine-readable code for the error
    pub fn code(&self) -> &'static str {
        match self {
            WardenError::Git(_) => "GIT_ERROR",
            WardenError::Io(_) => "IO_ERROR",
            WardenError::Serialization(_) => "SERIALIZATION_ERROR",
            WardenError::RepositoryUnavailable(_) => "REPO_UNAVAILABLE",
            WardenError::InvalidSetting(_) => "INVALID_SETTING",
            WardenError::AlreadyInProgress(_) => "ALREADY_IN_PROGRESS",
            WardenError::SchedulerStopped => "SCHEDULER_STOPPED",
            WardenError::OperationFailed(_) => "OPERATION_FAILED",
        }
    }
}

/// Failure of a single remote inside a repository fetch.
///
/// None of these abort the sibling remotes; the coordinator records them and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Failed to create remote {remote}: {message}")]
    RemoteCreateFailed { remote: String, message: String },

    #[error("Fetch from {remote} failed: {message}")]
    FetchFailed { remote: String, message: String },

    #[error("Authentication failed for {remote}: {message}")]
    AuthFailed { remote: String, message: String },

    #[error("Connection timeout after {seconds} seconds")]
    ConnectionTimeout { remote: String, seconds: u64 },
}

impl FetchError {
    /// Classify a git2 fetch error for the named remote
    pub fn from_git(remote: &str, error: &git2::Error) -> Self {
        let message = error.message().to_string();
        match error.code() {
            git2::ErrorCode::Auth | git2::ErrorCode::User => FetchError::AuthFailed {
                remote: remote.to_string(),
                message,
            },
            _ => FetchError::FetchFailed {
                remote: remote.to_string(),
                message,
            },
        }
    }

    pub fn remote(&self) -> &str {
        match self {
            FetchError::RemoteCreateFailed { remote, .. }
            | FetchError::FetchFailed { remote, .. }
            | FetchError::AuthFailed { remote, .. }
            | FetchError::ConnectionTimeout { remote, .. } => remote,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::ConnectionTimeout { .. })
    }
}

/// Result type alias for Fetchwarden operations
pub type Result<T> = std::result::Result<T, WardenError>;

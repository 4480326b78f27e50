//! Fetch outcome and lifecycle event models

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::remote::RemoteStatus;
use super::repository::Repository;
use crate::error::FetchError;

/// Commit counts between a local branch tip and a remote-tracking tip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Divergence {
    pub ahead: usize,
    pub behind: usize,
}

/// Terminal state of one repository fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchState {
    /// No remotes configured; nothing was attempted
    Skipped,
    /// An abandoned fetch for the same repository has not finished yet
    StillRunning,
    RepoUnavailable,
    AllSucceeded,
    PartialFailure,
    Cancelled,
    OperationTimedOut,
}

impl FetchState {
    /// Whether this state is reported through an error event rather than a finished event
    pub fn is_error(self) -> bool {
        matches!(
            self,
            FetchState::StillRunning | FetchState::RepoUnavailable | FetchState::OperationTimedOut
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteFailureKind {
    RemoteCreateFailed,
    FetchFailed,
    AuthFailed,
    ConnectionTimeout,
}

/// A remote that failed during an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFailure {
    pub remote: String,
    pub kind: RemoteFailureKind,
    pub message: String,
}

impl From<&FetchError> for RemoteFailure {
    fn from(error: &FetchError) -> Self {
        let kind = match error {
            FetchError::RemoteCreateFailed { .. } => RemoteFailureKind::RemoteCreateFailed,
            FetchError::FetchFailed { .. } => RemoteFailureKind::FetchFailed,
            FetchError::AuthFailed { .. } => RemoteFailureKind::AuthFailed,
            FetchError::ConnectionTimeout { .. } => RemoteFailureKind::ConnectionTimeout,
        };
        Self {
            remote: error.remote().to_string(),
            kind,
            message: error.to_string(),
        }
    }
}

impl RemoteFailure {
    /// Label used in the aggregate message
    fn label(&self) -> String {
        match self.kind {
            RemoteFailureKind::ConnectionTimeout => format!("{} (connection timeout)", self.remote),
            _ => self.remote.clone(),
        }
    }
}

/// What happened to one processed remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteReport {
    pub name: String,
    pub status: RemoteStatus,
    /// `None` when the fetch failed and previous counts still stand
    pub divergence: Option<Divergence>,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Result of one repository fetch attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutcome {
    pub repository_name: String,
    pub local_path: PathBuf,
    pub state: FetchState,
    pub success: bool,
    pub message: String,
    pub failed_remotes: Vec<RemoteFailure>,
    pub remotes: Vec<RemoteReport>,
    pub finished_at: DateTime<Utc>,
}

impl FetchOutcome {
    pub fn new(repo: &Repository, state: FetchState, message: impl Into<String>) -> Self {
        Self {
            repository_name: repo.name.clone(),
            local_path: repo.local_path.clone(),
            state,
            success: state == FetchState::AllSucceeded,
            message: message.into(),
            failed_remotes: Vec::new(),
            remotes: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    /// Outcome after every remote was processed
    pub fn completed(
        repo: &Repository,
        remotes: Vec<RemoteReport>,
        failed_remotes: Vec<RemoteFailure>,
    ) -> Self {
        let (state, message) = if failed_remotes.is_empty() {
            (
                FetchState::AllSucceeded,
                "All remotes fetched successfully".to_string(),
            )
        } else {
            let names: Vec<String> = failed_remotes.iter().map(RemoteFailure::label).collect();
            (
                FetchState::PartialFailure,
                format!("Some remotes failed: {}", names.join(", ")),
            )
        };

        Self {
            remotes,
            failed_remotes,
            ..Self::new(repo, state, message)
        }
    }

    /// Attach the remotes processed before the attempt stopped early
    pub fn with_progress(
        mut self,
        remotes: Vec<RemoteReport>,
        failed_remotes: Vec<RemoteFailure>,
    ) -> Self {
        self.remotes = remotes;
        self.failed_remotes = failed_remotes;
        self
    }

    pub fn failed_remote_names(&self) -> Vec<&str> {
        self.failed_remotes
            .iter()
            .map(|failure| failure.remote.as_str())
            .collect()
    }
}

/// Lifecycle event of a fetch attempt, delivered to the issuing context
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum FetchEvent {
    Started {
        repository: String,
        local_path: PathBuf,
    },
    Progress {
        repository: String,
        local_path: PathBuf,
        remote: String,
        percent: u8,
    },
    Finished(FetchOutcome),
    Error(FetchOutcome),
}

impl FetchEvent {
    /// Wrap an outcome in the terminal event its state calls for
    pub fn terminal(outcome: FetchOutcome) -> Self {
        if outcome.state.is_error() {
            FetchEvent::Error(outcome)
        } else {
            FetchEvent::Finished(outcome)
        }
    }

    pub fn repository(&self) -> &str {
        match self {
            FetchEvent::Started { repository, .. } | FetchEvent::Progress { repository, .. } => {
                repository
            }
            FetchEvent::Finished(outcome) | FetchEvent::Error(outcome) => &outcome.repository_name,
        }
    }

    pub fn local_path(&self) -> &Path {
        match self {
            FetchEvent::Started { local_path, .. } | FetchEvent::Progress { local_path, .. } => {
                local_path
            }
            FetchEvent::Finished(outcome) | FetchEvent::Error(outcome) => &outcome.local_path,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchEvent::Finished(_) | FetchEvent::Error(_))
    }
}

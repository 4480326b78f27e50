//! Repository models

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::fetch::{Divergence, FetchEvent, FetchOutcome, FetchState};
use super::remote::{Remote, RemoteStatus};
use super::timestamp::parse_timestamp;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_FETCH_INTERVAL_MINUTES: u32 = 60;

/// Aggregate status of the last fetch attempt of a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepositoryStatus {
    #[default]
    Ready,
    Fetching,
    Success,
    PartialFailure,
    Error,
    Timeout,
    Cancelled,
}

impl RepositoryStatus {
    /// Map a stored status label onto the closed set
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().trim_end_matches('.').to_ascii_lowercase();
        match label.as_str() {
            "fetching" => RepositoryStatus::Fetching,
            "success" => RepositoryStatus::Success,
            "partial-failure" => RepositoryStatus::PartialFailure,
            "error" => RepositoryStatus::Error,
            "timeout" => RepositoryStatus::Timeout,
            "cancelled" => RepositoryStatus::Cancelled,
            _ => RepositoryStatus::Ready,
        }
    }
}

impl From<FetchState> for RepositoryStatus {
    fn from(state: FetchState) -> Self {
        match state {
            FetchState::AllSucceeded => RepositoryStatus::Success,
            FetchState::PartialFailure => RepositoryStatus::PartialFailure,
            FetchState::OperationTimedOut => RepositoryStatus::Timeout,
            FetchState::Cancelled => RepositoryStatus::Cancelled,
            FetchState::RepoUnavailable | FetchState::StillRunning => RepositoryStatus::Error,
            FetchState::Skipped => RepositoryStatus::Ready,
        }
    }
}

/// A local working copy kept in sync with its remotes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RepositoryRecord")]
pub struct Repository {
    pub name: String,
    pub local_path: PathBuf,
    pub branch: String,
    pub fetch_interval_minutes: u32,
    pub enabled: bool,
    pub last_fetch: Option<DateTime<Utc>>,
    pub status: RepositoryStatus,
    pub remotes: Vec<Remote>,
}

impl Repository {
    pub fn new(name: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            local_path: local_path.into(),
            branch: DEFAULT_BRANCH.to_string(),
            fetch_interval_minutes: DEFAULT_FETCH_INTERVAL_MINUTES,
            enabled: true,
            last_fetch: None,
            status: RepositoryStatus::Ready,
            remotes: Vec::new(),
        }
    }

    pub fn with_remote(mut self, remote: Remote) -> Self {
        self.remotes.push(remote);
        self
    }

    /// Key identifying the repository: name and path together
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.local_path.display())
    }

    pub fn matches(&self, name: &str, local_path: &Path) -> bool {
        self.name == name && self.local_path == local_path
    }

    /// Whether a scheduled tick at `now` should fetch this repository
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_fetch {
            None => true,
            Some(last) => last + Duration::minutes(i64::from(self.fetch_interval_minutes)) <= now,
        }
    }

    /// Sum of ahead/behind counts over all remotes
    pub fn total_divergence(&self) -> Divergence {
        self.remotes
            .iter()
            .fold(Divergence::default(), |total, remote| Divergence {
                ahead: total.ahead + remote.commits_ahead,
                behind: total.behind + remote.commits_behind,
            })
    }

    /// Update status fields from a fetch lifecycle event.
    ///
    /// Returns `true` when the event belonged to this repository.
    pub fn apply_event(&mut self, event: &FetchEvent) -> bool {
        if !self.matches(event.repository(), event.local_path()) {
            return false;
        }

        match event {
            FetchEvent::Started { .. } => {
                self.status = RepositoryStatus::Fetching;
                for remote in &mut self.remotes {
                    remote.status = RemoteStatus::Fetching;
                }
            }
            FetchEvent::Progress { .. } => {}
            FetchEvent::Finished(outcome) | FetchEvent::Error(outcome) => {
                self.apply_outcome(outcome);
            }
        }
        true
    }

    fn apply_outcome(&mut self, outcome: &FetchOutcome) {
        if outcome.state == FetchState::Skipped {
            return;
        }

        self.status = outcome.state.into();
        self.last_fetch = Some(outcome.finished_at);

        for remote in &mut self.remotes {
            match outcome.remotes.iter().find(|r| r.name == remote.name) {
                Some(report) => {
                    remote.status = report.status;
                    if let Some(divergence) = report.divergence {
                        remote.commits_ahead = divergence.ahead;
                        remote.commits_behind = divergence.behind;
                    }
                    if report.fetched_at.is_some() {
                        remote.last_fetch = report.fetched_at;
                    }
                }
                // Not reached before the attempt stopped
                None if remote.status == RemoteStatus::Fetching => {
                    remote.status = RemoteStatus::Ready;
                }
                None => {}
            }
        }
    }
}

/// Lenient on-disk shape of a repository
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryRecord {
    name: String,
    local_path: PathBuf,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default, alias = "fetchInterval")]
    fetch_interval_minutes: Option<u32>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    last_fetch: Option<String>,
    #[serde(default)]
    status: Option<String>,
    /// Single-remote format from older configuration files
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    remotes: Vec<Remote>,
}

impl From<RepositoryRecord> for Repository {
    fn from(record: RepositoryRecord) -> Self {
        let mut remotes = Vec::with_capacity(record.remotes.len() + 1);
        if let Some(url) = record.url.filter(|url| !url.is_empty()) {
            remotes.push(Remote::new("origin", url));
        }
        remotes.extend(record.remotes);

        Self {
            name: record.name,
            local_path: record.local_path,
            branch: record
                .branch
                .filter(|branch| !branch.is_empty())
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            fetch_interval_minutes: record
                .fetch_interval_minutes
                .unwrap_or(DEFAULT_FETCH_INTERVAL_MINUTES)
                .clamp(1, 1440),
            enabled: record.enabled.unwrap_or(true),
            last_fetch: record.last_fetch.as_deref().and_then(parse_timestamp),
            status: record
                .status
                .as_deref()
                .map(RepositoryStatus::from_label)
                .unwrap_or_default(),
            remotes,
        }
    }
}

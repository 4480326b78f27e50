//! Remote models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp::parse_timestamp;

/// Fetch status of a single remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteStatus {
    #[default]
    Ready,
    Fetching,
    Success,
    Error,
}

impl RemoteStatus {
    /// Map a stored status label onto the closed set.
    ///
    /// Older configuration files carry free-form strings like "Fetching..." or "Timeout".
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().trim_end_matches('.').to_ascii_lowercase();
        match label.as_str() {
            "fetching" => RemoteStatus::Fetching,
            "success" => RemoteStatus::Success,
            "error" | "timeout" => RemoteStatus::Error,
            _ => RemoteStatus::Ready,
        }
    }
}

/// A named fetch endpoint of a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RemoteRecord")]
pub struct Remote {
    pub name: String,
    pub url: String,
    pub last_fetch: Option<DateTime<Utc>>,
    pub status: RemoteStatus,
    pub commits_ahead: usize,
    pub commits_behind: usize,
}

impl Remote {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            last_fetch: None,
            status: RemoteStatus::Ready,
            commits_ahead: 0,
            commits_behind: 0,
        }
    }
}

/// Lenient on-disk shape of a remote
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteRecord {
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    last_fetch: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    commits_ahead: usize,
    #[serde(default)]
    commits_behind: usize,
}

impl From<RemoteRecord> for Remote {
    fn from(record: RemoteRecord) -> Self {
        Self {
            name: record.name,
            url: record.url,
            last_fetch: record.last_fetch.as_deref().and_then(parse_timestamp),
            status: record
                .status
                .as_deref()
                .map(RemoteStatus::from_label)
                .unwrap_or_default(),
            commits_ahead: record.commits_ahead,
            commits_behind: record.commits_behind,
        }
    }
}

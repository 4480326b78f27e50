//! Repository fetch coordinator
//!
//! Fetches every remote of one repository in order and folds the per-remote results into a
//! single [`FetchOutcome`]. Remote failures never stop the remaining remotes; only a stop
//! request or the operation deadline ends an attempt early, and both are checked between remotes.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use super::cancellation::{CancellationToken, InFlightRegistry};
use super::fetch_service::{FetchBackend, RemoteFetcher};
use crate::models::{
    FetchEvent, FetchOutcome, FetchSettings, FetchState, RemoteFailure, RemoteReport,
    RemoteStatus, Repository,
};

pub struct FetchCoordinator<B> {
    fetcher: RemoteFetcher<B>,
    in_flight: Arc<InFlightRegistry>,
}

impl<B: FetchBackend> FetchCoordinator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let in_flight = Arc::new(InFlightRegistry::default());
        Self {
            fetcher: RemoteFetcher::new(backend, Arc::clone(&in_flight)),
            in_flight,
        }
    }

    /// Registry of abandoned fetches that have not returned yet
    pub fn in_flight(&self) -> &Arc<InFlightRegistry> {
        &self.in_flight
    }

    /// Fetch all remotes of `repo`, reporting every lifecycle event on `events`.
    ///
    /// A repository without remotes is skipped without events or backend calls.
    pub async fn fetch_repository(
        &self,
        repo: &Repository,
        settings: &FetchSettings,
        cancel: &CancellationToken,
        events: &UnboundedSender<FetchEvent>,
    ) -> FetchOutcome {
        let outcome = self.attempt(repo, settings, cancel, events).await;
        if outcome.state != FetchState::Skipped {
            let _ = events.send(FetchEvent::terminal(outcome.clone()));
        }
        outcome
    }

    /// Like [`fetch_repository`](Self::fetch_repository), but leaves sending the terminal
    /// event to the caller.
    pub async fn attempt(
        &self,
        repo: &Repository,
        settings: &FetchSettings,
        cancel: &CancellationToken,
        events: &UnboundedSender<FetchEvent>,
    ) -> FetchOutcome {
        if repo.remotes.is_empty() {
            tracing::info!("No remotes configured for repository: {}", repo.name);
            return FetchOutcome::new(repo, FetchState::Skipped, "No remotes configured");
        }

        tracing::info!(
            "Starting fetch for: {} ({} remotes)",
            repo.name,
            repo.remotes.len()
        );
        let _ = events.send(FetchEvent::Started {
            repository: repo.name.clone(),
            local_path: repo.local_path.clone(),
        });

        let outcome = self.run_attempt(repo, settings, cancel, events).await;

        if outcome.success {
            tracing::info!("Fetch complete for {}: {}", repo.name, outcome.message);
        } else {
            tracing::warn!(
                "Fetch for {} ended {:?}: {}",
                repo.name,
                outcome.state,
                outcome.message
            );
        }
        outcome
    }

    async fn run_attempt(
        &self,
        repo: &Repository,
        settings: &FetchSettings,
        cancel: &CancellationToken,
        events: &UnboundedSender<FetchEvent>,
    ) -> FetchOutcome {
        if self.in_flight.is_running(&repo.key()) {
            return FetchOutcome::new(
                repo,
                FetchState::StillRunning,
                format!(
                    "A previous fetch of {} is still running",
                    repo.local_path.display()
                ),
            );
        }

        if let Err(e) = self.fetcher.verify_repository(repo).await {
            return FetchOutcome::new(repo, FetchState::RepoUnavailable, e.to_string());
        }

        let connection_timeout = settings.connection_timeout();
        let deadline = Instant::now() + settings.operation_timeout();
        let timed_out_message = format!(
            "Fetch timed out after {} seconds",
            settings.operation_timeout_secs
        );

        let total = repo.remotes.len();
        let mut reports = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for (completed, remote) in repo.remotes.iter().enumerate() {
            if cancel.is_cancelled() {
                return FetchOutcome::new(repo, FetchState::Cancelled, "Fetch cancelled")
                    .with_progress(reports, failures);
            }

            let now = Instant::now();
            if now >= deadline {
                return FetchOutcome::new(repo, FetchState::OperationTimedOut, timed_out_message)
                    .with_progress(reports, failures);
            }

            let _ = events.send(FetchEvent::Progress {
                repository: repo.name.clone(),
                local_path: repo.local_path.clone(),
                remote: remote.name.clone(),
                percent: ((completed * 100) / total) as u8,
            });

            let limit = connection_timeout.min(deadline - now);
            match self.fetcher.fetch(repo, remote, limit).await {
                Ok(()) => {
                    let divergence = self.fetcher.divergence(repo, remote).await;
                    tracing::debug!(
                        "{}/{}: ahead {}, behind {}",
                        repo.name,
                        remote.name,
                        divergence.ahead,
                        divergence.behind
                    );
                    reports.push(RemoteReport {
                        name: remote.name.clone(),
                        status: RemoteStatus::Success,
                        divergence: Some(divergence),
                        fetched_at: Some(chrono::Utc::now()),
                    });
                }
                // The operation budget, not the connection timeout, ran out
                Err(e) if e.is_timeout() && limit < connection_timeout => {
                    return FetchOutcome::new(
                        repo,
                        FetchState::OperationTimedOut,
                        timed_out_message,
                    )
                    .with_progress(reports, failures);
                }
                Err(e) => {
                    tracing::warn!("Remote {} of {} failed: {}", remote.name, repo.name, e);
                    reports.push(RemoteReport {
                        name: remote.name.clone(),
                        status: RemoteStatus::Error,
                        divergence: None,
                        fetched_at: None,
                    });
                    failures.push(RemoteFailure::from(&e));
                }
            }
        }

        FetchOutcome::completed(repo, reports, failures)
    }
}

//! Fetch scheduler service
//!
//! A single worker task drains a queue of fetch requests, so at most one repository fetch runs
//! at any time. Requests carry a snapshot of the repository, and results come back only as
//! [`FetchEvent`]s on the event channel.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::cancellation::CancellationToken;
use super::coordinator::FetchCoordinator;
use super::fetch_service::FetchBackend;
use crate::error::{Result, WardenError};
use crate::models::{FetchEvent, FetchSettings, FetchState, Repository};

/// What asked for a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTrigger {
    Manual,
    Scheduled,
}

struct FetchRequest {
    repository: Repository,
    trigger: FetchTrigger,
}

/// Repositories selected by a scheduled tick at `now`
pub fn due_repositories(repos: &[Repository], now: DateTime<Utc>) -> Vec<&Repository> {
    repos.iter().filter(|repo| repo.is_due(now)).collect()
}

/// Keys of repositories that are queued or being fetched
#[derive(Clone, Default)]
struct PendingSet(Arc<Mutex<HashSet<String>>>);

impl PendingSet {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, key: String) -> bool {
        self.lock().insert(key)
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

type CurrentAttempt = Arc<Mutex<Option<CancellationToken>>>;

/// Issuing-side handle to the fetch worker
pub struct SchedulerHandle {
    requests: UnboundedSender<FetchRequest>,
    settings: watch::Sender<FetchSettings>,
    pending: PendingSet,
    current: CurrentAttempt,
    stopping: CancellationToken,
    worker: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Queue a manual fetch of one repository.
    ///
    /// Fails with `AlreadyInProgress` when the repository is already queued or being fetched.
    pub fn fetch_one(&self, repo: &Repository) -> Result<()> {
        if !self.enqueue(repo, FetchTrigger::Manual)? {
            return Err(WardenError::AlreadyInProgress(repo.name.clone()));
        }
        Ok(())
    }

    /// Queue every enabled repository, skipping ones already pending. Returns how many were queued.
    pub fn fetch_all_enabled(&self, repos: &[Repository]) -> Result<usize> {
        self.enqueue_all(
            repos.iter().filter(|repo| repo.enabled),
            FetchTrigger::Manual,
        )
    }

    /// Queue the repositories due at `now`, skipping ones already pending
    pub fn fetch_due(&self, repos: &[Repository], now: DateTime<Utc>) -> Result<usize> {
        self.enqueue_all(due_repositories(repos, now), FetchTrigger::Scheduled)
    }

    fn enqueue_all<'a>(
        &self,
        repos: impl IntoIterator<Item = &'a Repository>,
        trigger: FetchTrigger,
    ) -> Result<usize> {
        let mut queued = 0;
        for repo in repos {
            if self.enqueue(repo, trigger)? {
                queued += 1;
            } else {
                tracing::debug!("Skipping {}: fetch already pending", repo.name);
            }
        }
        Ok(queued)
    }

    /// Returns `false` when the repository is already pending
    fn enqueue(&self, repo: &Repository, trigger: FetchTrigger) -> Result<bool> {
        let key = repo.key();
        if !self.pending.insert(key.clone()) {
            return Ok(false);
        }

        let request = FetchRequest {
            repository: repo.clone(),
            trigger,
        };
        if self.requests.send(request).is_err() {
            self.pending.remove(&key);
            return Err(WardenError::SchedulerStopped);
        }
        Ok(true)
    }

    /// Replace the settings; the next attempt picks them up
    pub fn update_settings(&self, settings: FetchSettings) -> Result<()> {
        settings.validate()?;
        tracing::info!(
            "Timeouts now {}s per operation, {}s per connection",
            settings.operation_timeout_secs,
            settings.connection_timeout_secs
        );
        self.settings.send_replace(settings);
        Ok(())
    }

    pub fn settings(&self) -> FetchSettings {
        self.settings.borrow().clone()
    }

    /// Ask the running attempt to stop at its next remote boundary
    pub fn stop_current(&self) -> bool {
        match lock_current(&self.current).as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether any fetch is queued or running
    pub fn is_busy(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Stop the running attempt, drop queued requests and wait for the worker to exit
    pub async fn shutdown(self) {
        self.stopping.cancel();
        self.stop_current();
        drop(self.requests);
        if let Err(e) = self.worker.await {
            tracing::warn!("Fetch worker ended abnormally: {}", e);
        }
    }
}

fn lock_current(current: &CurrentAttempt) -> MutexGuard<'_, Option<CancellationToken>> {
    current.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The worker side: owns the coordinator and runs queued requests one by one
pub struct FetchScheduler<B> {
    coordinator: FetchCoordinator<B>,
    requests: UnboundedReceiver<FetchRequest>,
    settings: watch::Receiver<FetchSettings>,
    events: UnboundedSender<FetchEvent>,
    pending: PendingSet,
    current: CurrentAttempt,
    stopping: CancellationToken,
}

impl<B: FetchBackend> FetchScheduler<B> {
    /// Start the worker task. Events for every attempt arrive on the returned receiver.
    pub fn spawn(
        backend: Arc<B>,
        settings: FetchSettings,
    ) -> Result<(SchedulerHandle, UnboundedReceiver<FetchEvent>)> {
        settings.validate()?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (settings_tx, settings_rx) = watch::channel(settings);
        let pending = PendingSet::default();
        let current = CurrentAttempt::default();
        let stopping = CancellationToken::new();

        let scheduler = FetchScheduler {
            coordinator: FetchCoordinator::new(backend),
            requests: request_rx,
            settings: settings_rx,
            events: event_tx,
            pending: pending.clone(),
            current: Arc::clone(&current),
            stopping: stopping.clone(),
        };
        let worker = tokio::spawn(scheduler.run());

        let handle = SchedulerHandle {
            requests: request_tx,
            settings: settings_tx,
            pending,
            current,
            stopping,
            worker,
        };
        Ok((handle, event_rx))
    }

    async fn run(mut self) {
        tracing::info!("Fetch worker started");

        while let Some(request) = self.requests.recv().await {
            let repo = request.repository;
            let key = repo.key();

            if self.stopping.is_cancelled() {
                self.pending.remove(&key);
                continue;
            }

            let settings = self.settings.borrow().clone();
            let cancel = CancellationToken::new();
            *lock_current(&self.current) = Some(cancel.clone());

            tracing::debug!("Running {:?} fetch for {}", request.trigger, repo.name);
            let outcome = self
                .coordinator
                .attempt(&repo, &settings, &cancel, &self.events)
                .await;

            *lock_current(&self.current) = None;
            // Free the slot before consumers see the terminal event
            self.pending.remove(&key);

            if outcome.state != FetchState::Skipped {
                let _ = self.events.send(FetchEvent::terminal(outcome));
            }
        }

        tracing::info!("Fetch worker stopped");
    }
}

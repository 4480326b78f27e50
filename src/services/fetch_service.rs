//! Single-remote fetching over git2, bounded by a connection timeout

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use git2::{AutotagOption, ErrorCode, FetchOptions};

use super::cancellation::InFlightRegistry;
use super::credentials_service::CredentialResolver;
use super::divergence_service::compute_divergence;
use crate::error::{FetchError, Result, WardenError};
use crate::models::{Divergence, Remote, Repository};

/// Version-control capability used by the fetch pipeline.
///
/// Every method is blocking and is called from the blocking thread pool.
pub trait FetchBackend: Send + Sync + 'static {
    /// Check that `path` is an openable working copy
    fn verify_repository(&self, path: &Path) -> Result<()>;

    /// Fetch one remote, creating it from its URL if the repository does not know it yet
    fn fetch_remote(&self, path: &Path, remote: &Remote) -> std::result::Result<(), FetchError>;

    /// Ahead/behind of the local branch against `<remote>/<branch>`
    fn divergence(&self, path: &Path, remote: &str, branch: &str) -> Divergence;
}

/// libgit2-backed implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Backend;

impl FetchBackend for Git2Backend {
    fn verify_repository(&self, path: &Path) -> Result<()> {
        git2::Repository::open(path)
            .map(|_| ())
            .map_err(|_| WardenError::RepositoryUnavailable(path.display().to_string()))
    }

    fn fetch_remote(&self, path: &Path, remote: &Remote) -> std::result::Result<(), FetchError> {
        let repo =
            git2::Repository::open(path).map_err(|e| FetchError::from_git(&remote.name, &e))?;

        let mut git_remote = match repo.find_remote(&remote.name) {
            Ok(found) => found,
            // An invalid name is rejected again, and reported, by the create call
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                tracing::info!("Creating remote {} -> {}", remote.name, remote.url);
                repo.remote(&remote.name, &remote.url)
                    .map_err(|e| FetchError::RemoteCreateFailed {
                        remote: remote.name.clone(),
                        message: e.message().to_string(),
                    })?
            }
            Err(e) => return Err(FetchError::from_git(&remote.name, &e)),
        };

        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(CredentialResolver::new().into_callbacks());
        fetch_opts.download_tags(AutotagOption::None);

        git_remote
            .fetch(&[] as &[&str], Some(&mut fetch_opts), None)
            .map_err(|e| FetchError::from_git(&remote.name, &e))
    }

    fn divergence(&self, path: &Path, remote: &str, branch: &str) -> Divergence {
        match git2::Repository::open(path) {
            Ok(repo) => compute_divergence(&repo, remote, branch),
            Err(e) => {
                tracing::warn!("Cannot open {} for divergence: {}", path.display(), e);
                Divergence::default()
            }
        }
    }
}

/// Recompute ahead/behind of every remote from local refs, without touching the network.
///
/// Working copies that cannot be opened keep their stored counts. Returns `true` when any
/// count changed.
pub async fn refresh_divergence<B: FetchBackend>(
    backend: Arc<B>,
    repos: &mut [Repository],
) -> bool {
    let snapshot = repos.to_vec();
    let computed = tokio::task::spawn_blocking(move || {
        snapshot
            .iter()
            .map(|repo| {
                if let Err(e) = backend.verify_repository(&repo.local_path) {
                    tracing::warn!("Not refreshing counts for {}: {}", repo.name, e);
                    return None;
                }
                let counts: Vec<Divergence> = repo
                    .remotes
                    .iter()
                    .map(|remote| backend.divergence(&repo.local_path, &remote.name, &repo.branch))
                    .collect();
                Some(counts)
            })
            .collect::<Vec<_>>()
    })
    .await;

    let computed = match computed {
        Ok(computed) => computed,
        Err(e) => {
            tracing::warn!("Divergence refresh task failed: {}", e);
            return false;
        }
    };

    let mut changed = false;
    for (repo, counts) in repos.iter_mut().zip(computed) {
        let Some(counts) = counts else {
            continue;
        };
        for (remote, divergence) in repo.remotes.iter_mut().zip(counts) {
            if remote.commits_ahead != divergence.ahead || remote.commits_behind != divergence.behind
            {
                remote.commits_ahead = divergence.ahead;
                remote.commits_behind = divergence.behind;
                changed = true;
            }
        }
    }
    changed
}

/// Fetches single remotes without blocking the caller past a time limit
pub struct RemoteFetcher<B> {
    backend: Arc<B>,
    in_flight: Arc<InFlightRegistry>,
}

impl<B: FetchBackend> RemoteFetcher<B> {
    pub fn new(backend: Arc<B>, in_flight: Arc<InFlightRegistry>) -> Self {
        Self { backend, in_flight }
    }

    /// Fetch `remote` of `repo`, giving up after `limit`.
    ///
    /// The backend call cannot be interrupted. On timeout it is left running detached and its
    /// result is dropped; the repository stays marked in the in-flight registry until it returns.
    pub async fn fetch(
        &self,
        repo: &Repository,
        remote: &Remote,
        limit: Duration,
    ) -> std::result::Result<(), FetchError> {
        let guard = self.in_flight.begin(&repo.key());
        let backend = Arc::clone(&self.backend);
        let path = repo.local_path.clone();
        let owned_remote = remote.clone();

        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            backend.fetch_remote(&path, &owned_remote)
        });

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(FetchError::FetchFailed {
                remote: remote.name.clone(),
                message: format!("Fetch task failed: {}", e),
            }),
            Err(_) => {
                tracing::warn!(
                    "Fetch of {} from {} exceeded {:?}; abandoning it",
                    repo.name,
                    remote.name,
                    limit
                );
                Err(FetchError::ConnectionTimeout {
                    remote: remote.name.clone(),
                    seconds: limit.as_secs(),
                })
            }
        }
    }

    /// Divergence for a remote that was just fetched
    pub async fn divergence(&self, repo: &Repository, remote: &Remote) -> Divergence {
        let backend = Arc::clone(&self.backend);
        let path = repo.local_path.clone();
        let remote_name = remote.name.clone();
        let branch = repo.branch.clone();

        tokio::task::spawn_blocking(move || backend.divergence(&path, &remote_name, &branch))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Divergence task failed: {}", e);
                Divergence::default()
            })
    }

    /// Check the working copy off the async runtime
    pub async fn verify_repository(&self, repo: &Repository) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let path = repo.local_path.clone();

        tokio::task::spawn_blocking(move || backend.verify_repository(&path))
            .await
            .map_err(|e| WardenError::OperationFailed(format!("Task failed: {}", e)))?
    }
}

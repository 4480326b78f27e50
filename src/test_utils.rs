//! Test utilities for creating temporary git repositories

#![cfg(test)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use crate::error::{FetchError, Result, WardenError};
use crate::models::{Divergence, Remote};
use crate::services::fetch_service::FetchBackend;

/// A temporary git repository for testing
pub struct TestRepo {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestRepo {
    /// Create a new empty git repository
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().to_path_buf();

        let repo = git2::Repository::init(&path).expect("Failed to init repo");
        Self::configure_user(&repo);

        Self { dir, path }
    }

    /// Create a repository with an initial commit
    pub fn with_initial_commit() -> Self {
        let test_repo = Self::new();
        test_repo.create_commit("Initial commit", &[("README.md", "# Test Repo")]);
        test_repo
    }

    /// Clone another test repository over its local path
    pub fn clone_from(upstream: &TestRepo) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("clone");

        let repo = git2::Repository::clone(&upstream.path_str(), &path).expect("Failed to clone");
        Self::configure_user(&repo);

        Self { dir, path }
    }

    fn configure_user(repo: &git2::Repository) {
        let mut config = repo.config().expect("Failed to get config");
        config
            .set_str("user.name", "Test User")
            .expect("Failed to set user.name");
        config
            .set_str("user.email", "test@example.com")
            .expect("Failed to set user.email");
    }

    /// Get the repository path as a string
    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    /// Get the git2 repository
    pub fn repo(&self) -> git2::Repository {
        git2::Repository::open(&self.path).expect("Failed to open repo")
    }

    /// Create a file with content
    pub fn create_file(&self, name: &str, content: &str) {
        let file_path = self.path.join(name);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&file_path, content).expect("Failed to write file");
    }

    /// Stage a file
    pub fn stage_file(&self, name: &str) {
        let repo = self.repo();
        let mut index = repo.index().expect("Failed to get index");
        index
            .add_path(std::path::Path::new(name))
            .expect("Failed to stage file");
        index.write().expect("Failed to write index");
    }

    /// Create a commit with the given files
    pub fn create_commit(&self, message: &str, files: &[(&str, &str)]) -> git2::Oid {
        let repo = self.repo();

        for (name, content) in files {
            self.create_file(name, content);
            self.stage_file(name);
        }

        let mut index = repo.index().expect("Failed to get index");
        let tree_oid = index.write_tree().expect("Failed to write tree");
        let tree = repo.find_tree(tree_oid).expect("Failed to find tree");
        let sig = repo.signature().expect("Failed to get signature");

        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.as_ref().into_iter().collect();

        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("Failed to create commit")
    }

    /// Move the current branch (and working tree) to the given commit
    pub fn set_head_to(&self, oid: git2::Oid) {
        let repo = self.repo();
        let commit = repo.find_commit(oid).expect("Failed to find commit");
        repo.reset(commit.as_object(), git2::ResetType::Hard, None)
            .expect("Failed to reset");
    }

    /// Get the current branch name
    pub fn current_branch(&self) -> String {
        let repo = self.repo();
        let head = repo.head().expect("Failed to get HEAD");
        head.shorthand().unwrap_or("").to_string()
    }

    /// Get the HEAD commit OID
    pub fn head_oid(&self) -> git2::Oid {
        let repo = self.repo();
        let head = repo.head().expect("Failed to get HEAD");
        head.target().expect("Failed to get target")
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// How a [`ScriptedBackend`] answers a fetch of one remote
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    Sleep(Duration),
}

/// Fetch backend with scripted per-remote results that records how it was called
#[derive(Default)]
pub struct ScriptedBackend {
    behaviors: HashMap<String, Behavior>,
    default_behavior: Option<Behavior>,
    divergence: Divergence,
    unavailable: bool,
    calls: AtomicUsize,
    fetches: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedBackend {
    pub fn with_behavior(mut self, remote: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(remote.to_string(), behavior);
        self
    }

    pub fn with_default(mut self, behavior: Behavior) -> Self {
        self.default_behavior = Some(behavior);
        self
    }

    pub fn with_divergence(mut self, divergence: Divergence) -> Self {
        self.divergence = divergence;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Number of backend invocations of any kind
    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of backend invocations observed running at once
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn track<T>(&self, f: impl FnOnce() -> T) -> T {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let result = f();
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl FetchBackend for ScriptedBackend {
    fn verify_repository(&self, path: &Path) -> Result<()> {
        self.track(|| {
            if self.unavailable {
                Err(WardenError::RepositoryUnavailable(path.display().to_string()))
            } else {
                Ok(())
            }
        })
    }

    fn fetch_remote(&self, _path: &Path, remote: &Remote) -> std::result::Result<(), FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .get(&remote.name)
            .copied()
            .or(self.default_behavior)
            .unwrap_or(Behavior::Succeed);

        self.track(|| match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(FetchError::FetchFailed {
                remote: remote.name.clone(),
                message: "connection refused".to_string(),
            }),
            Behavior::Sleep(delay) => {
                std::thread::sleep(delay);
                Ok(())
            }
        })
    }

    fn divergence(&self, _path: &Path, _remote: &str, _branch: &str) -> Divergence {
        self.track(|| self.divergence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_repo() {
        let repo = TestRepo::new();
        assert!(repo.path.exists());
        assert!(repo.path.join(".git").exists());
    }

    #[test]
    fn test_create_commit() {
        let repo = TestRepo::with_initial_commit();
        let git_repo = repo.repo();
        let head = git_repo.head().expect("No HEAD");
        assert!(head.target().is_some());
    }

    #[test]
    fn test_clone_tracks_upstream() {
        let upstream = TestRepo::with_initial_commit();
        let clone = TestRepo::clone_from(&upstream);
        assert_eq!(clone.head_oid(), upstream.head_oid());
        assert!(clone.repo().find_remote("origin").is_ok());
    }
}

//! Cooperative cancellation and tracking of abandoned fetches

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A token that can be used to check if a fetch attempt has been asked to stop
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request a stop at the next remote boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if a stop has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of blocking fetches that may still be running, per repository.
///
/// A fetch that outlives its timeout is abandoned, not stopped. Its guard stays registered
/// until the blocking call really returns, so a new attempt on the same working copy can be
/// refused in the meantime.
#[derive(Default, Debug)]
pub struct InFlightRegistry {
    running: Mutex<HashMap<String, usize>>,
}

impl InFlightRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a blocking fetch for `key` as running until the returned guard is dropped
    pub fn begin(self: &Arc<Self>, key: &str) -> InFlightGuard {
        *self.lock().entry(key.to_string()).or_insert(0) += 1;
        InFlightGuard {
            registry: Arc::clone(self),
            key: key.to_string(),
        }
    }

    /// Whether any blocking fetch for `key` has not returned yet
    pub fn is_running(&self, key: &str) -> bool {
        self.lock().get(key).is_some_and(|count| *count > 0)
    }

    fn finish(&self, key: &str) {
        let mut running = self.lock();
        if let Some(count) = running.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                running.remove(key);
            }
        }
    }
}

/// Keeps a repository marked as "possibly still running" while alive
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.finish(&self.key);
    }
}

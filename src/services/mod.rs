//! Service layer for Fetchwarden
//!
//! The fetch pipeline from the bottom up: credential and divergence helpers over git2, the
//! timeout-bounded single-remote fetcher, the per-repository coordinator and the single-flight
//! scheduler that owns the worker task.

pub mod cancellation;
pub mod coordinator;
pub mod credentials_service;
pub mod divergence_service;
pub mod fetch_service;
pub mod scheduler_service;
pub mod store;

pub use cancellation::{CancellationToken, InFlightRegistry};
pub use coordinator::FetchCoordinator;
pub use credentials_service::CredentialResolver;
pub use divergence_service::compute_divergence;
pub use fetch_service::{refresh_divergence, FetchBackend, Git2Backend, RemoteFetcher};
pub use scheduler_service::{due_repositories, FetchScheduler, FetchTrigger, SchedulerHandle};
pub use store::RepositoryStore;

//! Fetchwarden - background fetcher for local git working copies
//!
//! Keeps a list of repositories fetched from all of their remotes, one repository at a time,
//! with every network operation bounded by a timeout.

pub mod error;
pub mod models;
pub mod services;

#[cfg(test)]
mod test_utils;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::Result;
use crate::models::FetchEvent;
use crate::services::{
    refresh_divergence, FetchBackend, FetchScheduler, Git2Backend, RepositoryStore,
};

/// Run the daemon until Ctrl-C
pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fetchwarden_lib=info,git2=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Fetchwarden");

    let store = RepositoryStore::load(RepositoryStore::default_path()?)?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    let store = serve(store, Arc::new(Git2Backend), shutdown).await?;
    store.save()?;
    Ok(())
}

/// Drive scheduled fetches for `store` until `shutdown` resolves.
///
/// Ahead/behind counts are first recomputed from local refs, so they are current before any
/// fetch. Every scan tick then queues the repositories that are due. Events are folded back
/// into the store, which is saved after each finished attempt. Returns the final store.
pub async fn serve<B: FetchBackend>(
    mut store: RepositoryStore,
    backend: Arc<B>,
    shutdown: impl Future<Output = ()>,
) -> Result<RepositoryStore> {
    if refresh_divergence(Arc::clone(&backend), &mut store.repositories).await {
        tracing::info!("Updated stored ahead/behind counts from local refs");
        if let Err(e) = store.save() {
            tracing::warn!("Failed to save repository list: {}", e);
        }
    }

    let (handle, mut events) = FetchScheduler::spawn(backend, store.settings.clone())?;

    let mut ticker = tokio::time::interval(store.settings.scan_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !store.settings.auto_fetch {
                    continue;
                }
                let queued = handle.fetch_due(&store.repositories, Utc::now())?;
                if queued > 0 {
                    tracing::info!("Scheduled fetch for {} repositories", queued);
                }
            }
            Some(event) = events.recv() => {
                record_event(&mut store, &event);
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    handle.shutdown().await;
    while let Some(event) = events.recv().await {
        record_event(&mut store, &event);
    }
    Ok(store)
}

fn record_event(store: &mut RepositoryStore, event: &FetchEvent) {
    let Some(repo) = store.find_mut(event.repository(), event.local_path()) else {
        tracing::debug!("Event for unknown repository {}", event.repository());
        return;
    };
    repo.apply_event(event);

    if event.is_terminal() {
        if let Err(e) = store.save() {
            tracing::warn!("Failed to save repository list: {}", e);
        }
    }
}

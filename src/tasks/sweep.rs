//! Orphan Sweep Task
//!
//! Background task that periodically reclaims blobs no cache entry refers to.
//! Eviction itself never runs here; it only happens inside uploads.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::with_engine;
use crate::cache::CacheEngine;

/// Spawns a background task that periodically sweeps orphaned blobs.
///
/// The task sleeps for the given interval between runs and takes the
/// engine's write lock for each sweep, so it never races an upload. The
/// directory scan itself runs on the blocking pool.
///
/// # Arguments
/// * `cache` - Shared reference to the cache engine
/// * `sweep_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_sweep_task(
    cache: Arc<RwLock<CacheEngine>>,
    sweep_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(sweep_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting orphan sweep task with interval of {} seconds",
            sweep_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let result = with_engine(&cache, |engine| engine.sweep_orphans()).await;

            match result {
                Ok(0) => debug!("Orphan sweep: nothing to reclaim"),
                Ok(reclaimed) => info!("Orphan sweep: reclaimed {} blobs", reclaimed),
                Err(e) => warn!("Orphan sweep failed: {}", e),
            }
        }
    })
}

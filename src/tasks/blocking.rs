//! Blocking Engine Calls
//!
//! Engine operations do file and database I/O synchronously. They run on
//! tokio's blocking pool so a slow disk never stalls the async workers.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::CacheEngine;
use crate::error::{CacheError, Result};

/// Runs `f` against the engine on the blocking pool.
///
/// The write lock is held for the whole call, so engine operations stay
/// serialized exactly as with an inline `write().await`.
pub async fn with_engine<T, F>(cache: &Arc<RwLock<CacheEngine>>, f: F) -> Result<T>
where
    F: FnOnce(&mut CacheEngine) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let mut guard = cache.clone().write_owned().await;
    tokio::task::spawn_blocking(move || f(&mut *guard))
        .await
        .map_err(|e| CacheError::TaskFailure(e.to_string()))?
}

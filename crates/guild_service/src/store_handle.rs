//! Async facade over the synchronous store.
//!
//! Storage I/O must never run on the async context (it would stall the
//! node's tick-equivalent), so every operation is shipped to the
//! blocking pool. The closure owns its store reference for the whole
//! call; nothing storage-related is ever held across an await.

use std::sync::Arc;

use guild_store::{GuildStore, StoreError};

use crate::error::{GuildError, GuildResult};

/// Cheaply clonable handle that runs store closures on the blocking
/// pool and translates their errors.
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<GuildStore>,
}

impl StoreHandle {
    pub fn new(store: Arc<GuildStore>) -> Self {
        Self { store }
    }

    /// Runs one store operation off-thread and maps its outcome into
    /// the service error space.
    pub async fn run<T, F>(&self, op: F) -> GuildResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&GuildStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| GuildError::Internal(format!("storage task failed: {e}")))?
            .map_err(GuildError::from)
    }

    /// Like [`run`](Self::run) but keeps the raw [`StoreError`] so the
    /// caller can branch on storage-specific variants before the
    /// generic translation.
    pub async fn run_raw<T, F>(&self, op: F) -> Result<Result<T, StoreError>, GuildError>
    where
        T: Send + 'static,
        F: FnOnce(&GuildStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| GuildError::Internal(format!("storage task failed: {e}")))
    }
}

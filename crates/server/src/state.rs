use std::collections::HashMap;
use std::sync::Arc;

use categorizer_import::ImportBatch;
use categorizer_storage::DbPool;
use chrono::Utc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use uuid::Uuid;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub imports: Arc<ImportSessions>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: DbPool, config: ServerConfig) -> Self {
        Self {
            db,
            imports: Arc::new(ImportSessions::new(config.import_session_ttl())),
            config: Arc::new(config),
        }
    }
}

/// In-flight import batches. Nothing here survives a restart.
pub struct ImportSessions {
    batches: Mutex<HashMap<Uuid, ImportBatch>>,
    ttl: chrono::Duration,
}

impl ImportSessions {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            batches: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Stores a new batch, dropping any that have expired.
    pub async fn insert(&self, batch: ImportBatch) {
        let mut batches = self.batches.lock().await;
        let now = Utc::now();
        let before = batches.len();
        batches.retain(|_, b| !b.is_expired(now, self.ttl));
        let purged = before - batches.len();
        if purged > 0 {
            tracing::info!(purged, "Dropped expired import batches");
        }
        batches.insert(batch.id, batch);
    }

    /// Exclusive access to one batch. The guard keeps the whole session map
    /// locked, so hold it only for the duration of one request.
    pub async fn get(&self, id: Uuid) -> Option<MappedMutexGuard<'_, ImportBatch>> {
        let mut batches = self.batches.lock().await;
        if batches
            .get(&id)
            .is_some_and(|b| b.is_expired(Utc::now(), self.ttl))
        {
            batches.remove(&id);
            tracing::info!(batch_id = %id, "Import batch expired");
        }
        MutexGuard::try_map(batches, |b| b.get_mut(&id)).ok()
    }

    pub async fn remove(&self, id: Uuid) -> Option<ImportBatch> {
        self.batches.lock().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.batches.lock().await.len()
    }
}

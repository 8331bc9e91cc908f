//! API-key cache, dual-indexed by id and by 12-char prefix (spec §4.A,
//! §6) — the prefix index is what the auth middleware hits on every
//! request, so it stays hot without touching storage.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::ApiKey;
use crate::storage::{StorageError, StorageGateway};

use super::{CacheCounters, CacheStats};

#[derive(Default)]
struct Index {
    by_id: HashMap<Uuid, ApiKey>,
    by_prefix: HashMap<String, Uuid>,
}

pub struct KeyCache {
    storage: Arc<dyn StorageGateway>,
    index: RwLock<Index>,
    counters: CacheCounters,
}

impl KeyCache {
    pub fn new(storage: Arc<dyn StorageGateway>) -> Self {
        Self { storage, index: RwLock::new(Index::default()), counters: CacheCounters::default() }
    }

    fn insert_locked(index: &mut Index, key: ApiKey) {
        index.by_prefix.insert(key.prefix.clone(), key.id);
        index.by_id.insert(key.id, key);
    }

    pub async fn lookup(&self, id: Uuid) -> Result<ApiKey, StorageError> {
        if let Some(key) = self.index.read().await.by_id.get(&id).cloned() {
            self.counters.record_hit();
            return Ok(key);
        }
        self.counters.record_miss();
        let key = self.storage.get_api_key(id).await?;
        Self::insert_locked(&mut *self.index.write().await, key.clone());
        Ok(key)
    }

    pub async fn lookup_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, StorageError> {
        {
            let index = self.index.read().await;
            if let Some(id) = index.by_prefix.get(prefix) {
                self.counters.record_hit();
                return Ok(index.by_id.get(id).cloned());
            }
        }
        self.counters.record_miss();
        let key = self.storage.find_api_key_by_prefix(prefix).await?;
        if let Some(key) = &key {
            Self::insert_locked(&mut *self.index.write().await, key.clone());
        }
        Ok(key)
    }

    pub async fn refresh(&self, id: Uuid) -> Result<ApiKey, StorageError> {
        let key = self.storage.get_api_key(id).await?;
        Self::insert_locked(&mut *self.index.write().await, key.clone());
        Ok(key)
    }

    pub async fn invalidate(&self, id: Uuid) {
        let mut index = self.index.write().await;
        if let Some(key) = index.by_id.remove(&id) {
            index.by_prefix.remove(&key.prefix);
        }
    }

    /// Drops and re-populates both indices from storage in one pass (spec
    /// §4.A `reload_all`) rather than just clearing.
    pub async fn reload_all(&self) -> Result<(), StorageError> {
        let keys = self.storage.list_api_keys().await?;
        let mut index = self.index.write().await;
        index.by_id.clear();
        index.by_prefix.clear();
        for key in keys {
            Self::insert_locked(&mut index, key);
        }
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.index.read().await.by_id.len();
        self.counters.snapshot(entries)
    }
}

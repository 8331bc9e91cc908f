//! Verb cache, dual-indexed by id and by infinitive (spec §4.A). Both
//! indices are mutated together so they never drift apart.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::Verb;
use crate::storage::{StorageError, StorageGateway};

use super::{CacheCounters, CacheStats};

#[derive(Default)]
struct Index {
    by_id: HashMap<Uuid, Verb>,
    by_infinitive: HashMap<String, Uuid>,
}

pub struct VerbCache {
    storage: Arc<dyn StorageGateway>,
    index: RwLock<Index>,
    counters: CacheCounters,
}

impl VerbCache {
    pub fn new(storage: Arc<dyn StorageGateway>) -> Self {
        Self { storage, index: RwLock::new(Index::default()), counters: CacheCounters::default() }
    }

    fn insert_locked(index: &mut Index, verb: Verb) {
        index.by_infinitive.insert(verb.infinitive.clone(), verb.id);
        index.by_id.insert(verb.id, verb);
    }

    pub async fn lookup(&self, id: Uuid) -> Result<Verb, StorageError> {
        if let Some(verb) = self.index.read().await.by_id.get(&id).cloned() {
            self.counters.record_hit();
            return Ok(verb);
        }
        self.counters.record_miss();
        let verb = self.storage.get_verb(id).await?;
        Self::insert_locked(&mut *self.index.write().await, verb.clone());
        Ok(verb)
    }

    pub async fn lookup_by_infinitive(&self, infinitive: &str) -> Result<Option<Verb>, StorageError> {
        {
            let index = self.index.read().await;
            if let Some(id) = index.by_infinitive.get(infinitive) {
                self.counters.record_hit();
                return Ok(index.by_id.get(id).cloned());
            }
        }
        self.counters.record_miss();
        let verb = self.storage.find_verb_by_infinitive(infinitive).await?;
        if let Some(verb) = &verb {
            Self::insert_locked(&mut *self.index.write().await, verb.clone());
        }
        Ok(verb)
    }

    /// Re-reads `id` from storage and replaces its entry (spec §4.A
    /// `refresh`) — called after any create/update that went through
    /// storage successfully.
    pub async fn refresh(&self, id: Uuid) -> Result<Verb, StorageError> {
        let verb = self.storage.get_verb(id).await?;
        Self::insert_locked(&mut *self.index.write().await, verb.clone());
        Ok(verb)
    }

    pub async fn invalidate(&self, id: Uuid) {
        let mut index = self.index.write().await;
        if let Some(verb) = index.by_id.remove(&id) {
            index.by_infinitive.remove(&verb.infinitive);
        }
    }

    /// Drops and re-populates both indices from storage in one pass (spec
    /// §4.A `reload_all`) rather than just clearing — a quiescent database
    /// reload must yield the same contents as before.
    pub async fn reload_all(&self) -> Result<(), StorageError> {
        let verbs = self.storage.list_verbs().await?;
        let mut index = self.index.write().await;
        index.by_id.clear();
        index.by_infinitive.clear();
        for verb in verbs {
            Self::insert_locked(&mut index, verb);
        }
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.index.read().await.by_id.len();
        self.counters.snapshot(entries)
    }
}

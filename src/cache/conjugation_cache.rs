//! Conjugation cache keyed by (infinitive, auxiliary) (spec §4.A). Each
//! entry holds every tense/reflexive variant stored for that pairing so a
//! single miss repopulates the whole verb's conjugation set.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{Auxiliary, Conjugation, Tense};
use crate::storage::{StorageError, StorageGateway};

use super::{CacheCounters, CacheStats};

type Key = (String, Auxiliary);

pub struct ConjugationCache {
    storage: Arc<dyn StorageGateway>,
    entries: RwLock<HashMap<Key, Vec<Conjugation>>>,
    counters: CacheCounters,
}

impl ConjugationCache {
    pub fn new(storage: Arc<dyn StorageGateway>) -> Self {
        Self { storage, entries: RwLock::new(HashMap::new()), counters: CacheCounters::default() }
    }

    async fn fetch(&self, infinitive: &str) -> Result<Vec<Conjugation>, StorageError> {
        self.storage.list_conjugations_for_verb(infinitive).await
    }

    pub async fn lookup(
        &self,
        infinitive: &str,
        auxiliary: Auxiliary,
        reflexive: bool,
        tense: Tense,
    ) -> Result<Option<Conjugation>, StorageError> {
        let key = (infinitive.to_string(), auxiliary);
        {
            let entries = self.entries.read().await;
            if let Some(set) = entries.get(&key) {
                self.counters.record_hit();
                return Ok(set
                    .iter()
                    .find(|c| c.reflexive == reflexive && c.tense == tense)
                    .cloned());
            }
        }
        self.counters.record_miss();
        let set = self.fetch(infinitive).await?;
        let found = set.iter().find(|c| c.reflexive == reflexive && c.tense == tense).cloned();
        self.entries.write().await.insert(key, set);
        Ok(found)
    }

    pub async fn refresh(&self, infinitive: &str, auxiliary: Auxiliary) -> Result<(), StorageError> {
        let set = self.fetch(infinitive).await?;
        self.entries.write().await.insert((infinitive.to_string(), auxiliary), set);
        Ok(())
    }

    pub async fn invalidate(&self, infinitive: &str, auxiliary: Auxiliary) {
        self.entries.write().await.remove(&(infinitive.to_string(), auxiliary));
    }

    /// Drops and re-populates from storage in one pass (spec §4.A
    /// `reload_all`), grouping every row back under its (infinitive,
    /// auxiliary) key rather than leaving the cache empty.
    pub async fn reload_all(&self) -> Result<(), StorageError> {
        let all = self.storage.list_conjugations().await?;
        let mut grouped: HashMap<Key, Vec<Conjugation>> = HashMap::new();
        for conjugation in all {
            grouped.entry((conjugation.infinitive.clone(), conjugation.auxiliary)).or_default().push(conjugation);
        }
        let mut entries = self.entries.write().await;
        *entries = grouped;
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await.values().map(|v| v.len()).sum();
        self.counters.snapshot(entries)
    }
}

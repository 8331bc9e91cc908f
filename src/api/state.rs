//! Shared API state (spec §6), grounded on the teacher's
//! `Arc<RwLock<ApiState>>` `SharedState` idiom, holding the caches,
//! storage gateway, broker handle, and rate limiter every handler needs.

use std::sync::Arc;

use crate::broker::QueueBroker;
use crate::cache::{ConjugationCache, KeyCache, VerbCache};
use crate::config::AppConfig;
use crate::selector::ProblemSelector;
use crate::storage::StorageGateway;
use crate::tracker::RequestTracker;

use super::rate_limit::RateLimiters;

pub struct ApiState {
    pub config: AppConfig,
    pub storage: Arc<dyn StorageGateway>,
    pub broker: Arc<dyn QueueBroker>,
    pub verb_cache: Arc<VerbCache>,
    pub conjugation_cache: Arc<ConjugationCache>,
    pub key_cache: Arc<KeyCache>,
    pub tracker: Arc<RequestTracker>,
    pub selector: Arc<ProblemSelector>,
    pub rate_limiters: RateLimiters,
}

pub type SharedState = Arc<ApiState>;

impl ApiState {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn StorageGateway>,
        broker: Arc<dyn QueueBroker>,
    ) -> Self {
        let virtual_staleness_seconds = config.virtual_staleness_seconds() as i64;
        Self {
            verb_cache: Arc::new(VerbCache::new(storage.clone())),
            conjugation_cache: Arc::new(ConjugationCache::new(storage.clone())),
            key_cache: Arc::new(KeyCache::new(storage.clone())),
            tracker: Arc::new(RequestTracker::new(storage.clone())),
            selector: Arc::new(ProblemSelector::new(storage.clone(), virtual_staleness_seconds)),
            rate_limiters: RateLimiters::new(),
            storage,
            broker,
            config,
        }
    }
}

//! Per-key requests-per-minute rate limiting (spec §6), backed by
//! `governor`'s token-bucket limiter, one bucket per distinct
//! `rate_limit_per_minute` value a key actually uses.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

use governor::{Quota, RateLimiter};
use uuid::Uuid;

type KeyedLimiter = RateLimiter<Uuid, governor::state::keyed::DashMapStateStore<Uuid>, governor::clock::DefaultClock>;

/// Buckets are keyed by `(per_minute_limit)` so keys sharing a limit
/// share a limiter, and re-keyed per `ApiKey::id` inside it — a key
/// whose configured limit changes simply starts fresh under the new
/// bucket.
pub struct RateLimiters {
    limiters: Mutex<HashMap<u32, Arc<KeyedLimiter>>>,
}

impl RateLimiters {
    pub fn new() -> Self {
        Self { limiters: Mutex::new(HashMap::new()) }
    }

    pub fn check(&self, key_id: Uuid, per_minute: u32) -> bool {
        let per_minute = per_minute.max(1);
        let limiter = {
            let mut limiters = self.limiters.lock().unwrap();
            limiters
                .entry(per_minute)
                .or_insert_with(|| {
                    let quota = Quota::per_minute(NonZeroU32::new(per_minute).expect("non-zero checked above"));
                    Arc::new(RateLimiter::dashmap(quota))
                })
                .clone()
        };
        limiter.check_key(&key_id).is_ok()
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new()
    }
}

use std::sync::Arc;

use chrono::Utc;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tracing::{debug, warn};

use crate::memory::{CacheKeys, DurableCache, SetOptions};
use crate::models::Item;

/// Tracks which item ids this process has already taken on.
///
/// The in-memory set is the authority for the process lifetime. Ids are also
/// written to the durable cache without expiry; that copy is only read back when
/// the in-memory set is bounded and may have evicted an older id.
pub struct DedupeTracker {
    seen: Cache<String, ()>,
    bounded: bool,
    watermark_ms: i64,
    cache: Arc<dyn DurableCache>,
    keys: CacheKeys,
}

impl DedupeTracker {
    /// Captures the startup watermark now.
    pub fn new(cache: Arc<dyn DurableCache>, keys: CacheKeys, capacity: Option<u64>) -> Self {
        Self::with_watermark(cache, keys, capacity, Utc::now().timestamp_millis())
    }

    pub fn with_watermark(
        cache: Arc<dyn DurableCache>,
        keys: CacheKeys,
        capacity: Option<u64>,
        watermark_ms: i64,
    ) -> Self {
        let seen = match capacity {
            Some(max) => Cache::builder()
                .max_capacity(max)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
            None => Cache::builder().build(),
        };
        DedupeTracker {
            seen,
            bounded: capacity.is_some(),
            watermark_ms,
            cache,
            keys,
        }
    }

    pub fn watermark_ms(&self) -> i64 {
        self.watermark_ms
    }

    /// Items without a timestamp count as stale: freshness cannot be shown.
    pub fn is_stale(&self, item: &Item) -> bool {
        match item.created_at_epoch_secs {
            Some(secs) => secs.saturating_mul(1000) < self.watermark_ms,
            None => true,
        }
    }

    #[cfg(test)]
    pub fn is_processed(&self, item_id: &str) -> bool {
        self.seen.contains_key(item_id)
    }

    /// Claims the item for processing. Returns true at most once per id.
    ///
    /// The id is recorded before any downstream work starts, so a duplicate
    /// later in the same fetch is dropped.
    pub async fn should_process(&self, item: &Item) -> bool {
        if !item.has_id() || item.created_at_epoch_secs.is_none() {
            debug!(author = %item.author_handle, "Discarding item without id or timestamp");
            return false;
        }
        if self.is_stale(item) {
            debug!(item_id = %item.id, "Skipping item older than startup watermark");
            return false;
        }
        if self.seen.contains_key(&item.id) {
            return false;
        }
        if self.bounded && self.persisted(&item.id).await {
            self.seen.insert(item.id.clone(), ());
            return false;
        }

        self.seen.entry(item.id.clone()).or_insert(()).is_fresh()
    }

    /// Records the id and persists it in the background. A failed write only
    /// costs durability, the in-memory set still blocks reprocessing.
    pub fn mark_processed(&self, item: &Item) {
        if !item.has_id() {
            return;
        }
        self.seen.insert(item.id.clone(), ());

        let value = match serde_json::to_string(item) {
            Ok(value) => value,
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Could not serialize processed item");
                return;
            }
        };
        let key = self.keys.processed(&item.id);
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            if let Err(e) = cache.set(&key, &value, SetOptions::default()).await {
                warn!(key = %key, error = %e, "Failed to persist processed item id");
            }
        });
    }

    async fn persisted(&self, item_id: &str) -> bool {
        match self.cache.get(&self.keys.processed(item_id)).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "Dedupe store lookup failed, using memory only");
                false
            }
        }
    }
}

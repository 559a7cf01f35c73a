use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, info};

use super::{CacheBackend, CacheResult};

struct CachedValue {
    bytes: Vec<u8>,
    /// `None` when the TTL reaches past what the clock can represent.
    expires_at: Option<Instant>,
}

impl CachedValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

/// [`CacheBackend`] holding values in a sharded concurrent map.
///
/// Expired entries are dropped lazily on read and in bulk by
/// [`MemoryCache::spawn_purge_task`].
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, CachedValue>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entry at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, value| value.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge expired entries until `shutdown` flips to `true`.
    pub fn spawn_purge_task(
        &self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            debug!(removed, "purged expired cache entries");
                        }
                    }
                }
            }
            info!("cache purge task stopped");
        })
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        match self.entries.get(key) {
            None => return None,
            Some(value) if value.is_live(now) => return Some(value.bytes.clone()),
            Some(_) => {}
        }

        self.entries
            .remove_if(key, |_, value| !value.is_live(now));
        None
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> BoxFuture<'static, CacheResult<Option<Vec<u8>>>> {
        let value = self.read(key);
        Box::pin(async move { Ok(value) })
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> BoxFuture<'static, CacheResult<()>> {
        self.entries.insert(
            key.to_owned(),
            CachedValue {
                bytes: value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Box::pin(async { Ok(()) })
    }

    fn delete(&self, keys: Vec<String>) -> BoxFuture<'static, CacheResult<u64>> {
        let removed = keys
            .iter()
            .filter(|key| self.entries.remove(key.as_str()).is_some())
            .count();
        Box::pin(async move { Ok(removed as u64) })
    }
}

//! Typed cache-aside layer over a [`CacheBackend`] for top-N and per-user rank lookups.
//!
//! Every failure here is logged and swallowed: a broken cache turns into a miss
//! on read and a no-op on write, so requests fall back to the rank table.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashSet;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::dao::{
    cache::{CacheBackend, CacheError, CacheResult},
    models::{RankEntryEntity, UserId},
};

const TOP_KEY_PREFIX: &str = "leaderboard:top";
const USER_KEY_PREFIX: &str = "leaderboard:user";

/// Cache key holding the first `limit` rank entries.
pub fn top_key(limit: usize) -> String {
    format!("{TOP_KEY_PREFIX}:{limit}")
}

/// Cache key holding the rank entry of `user_id`.
pub fn user_key(user_id: UserId) -> String {
    format!("{USER_KEY_PREFIX}:{user_id}")
}

/// Leaderboard projections stored in the shared cache.
#[derive(Clone)]
pub struct LeaderboardCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    top_sizes: Arc<DashSet<usize>>,
    top_generation: Arc<AtomicU64>,
}

impl LeaderboardCache {
    /// Wrap a backend, storing every value for `ttl`.
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            top_sizes: Arc::new(DashSet::new()),
            top_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cached top `limit` entries, or `None` on miss.
    pub async fn get_top(&self, limit: usize) -> Option<Vec<RankEntryEntity>> {
        let key = top_key(limit);
        match self.read::<Vec<RankEntryEntity>>(&key).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(key = %key, error = %err, "top leaderboard cache read failed");
                None
            }
        }
    }

    /// Store the top `limit` entries, empty slices included.
    pub async fn put_top(&self, limit: usize, entries: &[RankEntryEntity]) {
        self.put_top_at(limit, entries, self.top_generation()).await;
    }

    /// Current top-N invalidation generation.
    ///
    /// Read it before loading entries from the store and hand it back to
    /// [`LeaderboardCache::put_top_at`].
    pub fn top_generation(&self) -> u64 {
        self.top_generation.load(Ordering::Acquire)
    }

    /// Mark every top-N slice loaded so far as stale. Must happen before the
    /// matching keys are deleted.
    pub fn advance_top_generation(&self) -> u64 {
        self.top_generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Store the top `limit` entries loaded under `generation`.
    ///
    /// Entries loaded before a later recalculation are never left behind: the
    /// write is skipped when the generation moved, and undone when it moved
    /// while writing. Returns whether the entries stayed cached.
    pub async fn put_top_at(
        &self,
        limit: usize,
        entries: &[RankEntryEntity],
        generation: u64,
    ) -> bool {
        self.top_sizes.insert(limit);
        let key = top_key(limit);
        if self.top_generation() != generation {
            debug!(key = %key, "top leaderboard went stale while loading; not cached");
            return false;
        }

        if let Err(err) = self.write(&key, entries).await {
            warn!(key = %key, error = %err, "top leaderboard cache write failed");
            return false;
        }

        if self.top_generation() != generation {
            debug!(key = %key, "top leaderboard went stale while caching; dropping it");
            if let Err(err) = self.invalidate_top(limit).await {
                warn!(key = %key, error = %err, "top leaderboard cache invalidation failed");
            }
            return false;
        }
        true
    }

    /// Cached rank entry of `user_id`, or `None` on miss.
    pub async fn get_user_rank(&self, user_id: UserId) -> Option<RankEntryEntity> {
        let key = user_key(user_id);
        match self.read::<RankEntryEntity>(&key).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(user_id, error = %err, "user rank cache read failed");
                None
            }
        }
    }

    /// Store the rank entry of its user.
    pub async fn put_user_rank(&self, entry: &RankEntryEntity) {
        let key = user_key(entry.user_id);
        if let Err(err) = self.write(&key, entry).await {
            warn!(user_id = entry.user_id, error = %err, "user rank cache write failed");
        }
    }

    /// Drop the cached rank of `user_id`. Missing keys are not an error.
    pub async fn invalidate_user(&self, user_id: UserId) -> CacheResult<()> {
        self.backend.delete(vec![user_key(user_id)]).await?;
        Ok(())
    }

    /// Drop the cached top `limit` entries. Missing keys are not an error.
    pub async fn invalidate_top(&self, limit: usize) -> CacheResult<()> {
        self.backend.delete(vec![top_key(limit)]).await?;
        Ok(())
    }

    /// Every top-N size this cache has populated, sorted ascending.
    pub fn populated_top_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.top_sizes.iter().map(|size| *size).collect();
        sizes.sort_unstable();
        sizes
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(bytes) = self.backend.get(key).await? else {
            debug!(key, "cache miss");
            return Ok(None);
        };

        let value = serde_json::from_slice(&bytes).map_err(|source| CacheError::Decode {
            key: key.to_owned(),
            source,
        })?;
        debug!(key, "cache hit");
        Ok(Some(value))
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|source| CacheError::Encode {
            key: key.to_owned(),
            source,
        })?;
        self.backend.set(key, bytes, self.ttl).await
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use futures::future::BoxFuture;

    use super::*;
    use crate::dao::cache::MemoryCache;

    const TTL: Duration = Duration::from_secs(3600);

    struct UnreachableCache;

    fn unreachable() -> CacheError {
        CacheError::backend(
            "connection refused".into(),
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        )
    }

    impl CacheBackend for UnreachableCache {
        fn get(&self, _key: &str) -> BoxFuture<'static, CacheResult<Option<Vec<u8>>>> {
            Box::pin(async { Err(unreachable()) })
        }

        fn set(
            &self,
            _key: &str,
            _value: Vec<u8>,
            _ttl: Duration,
        ) -> BoxFuture<'static, CacheResult<()>> {
            Box::pin(async { Err(unreachable()) })
        }

        fn delete(&self, _keys: Vec<String>) -> BoxFuture<'static, CacheResult<u64>> {
            Box::pin(async { Err(unreachable()) })
        }
    }

    fn entry(user_id: UserId, total_score: i64, rank: u64) -> RankEntryEntity {
        RankEntryEntity {
            user_id,
            total_score,
            rank,
        }
    }

    #[test]
    fn keys_follow_query_shape() {
        assert_eq!(top_key(10), "leaderboard:top:10");
        assert_eq!(user_key(42), "leaderboard:user:42");
    }

    #[tokio::test]
    async fn populated_top_is_a_hit() {
        let cache = LeaderboardCache::new(Arc::new(MemoryCache::new()), TTL);
        assert_eq!(cache.get_top(10).await, None);

        let entries = vec![entry(1, 50, 1), entry(2, 30, 2)];
        cache.put_top(10, &entries).await;

        assert_eq!(cache.get_top(10).await, Some(entries));
        assert_eq!(cache.get_top(5).await, None);
    }

    #[tokio::test]
    async fn empty_top_is_cached_as_empty_sequence() {
        let cache = LeaderboardCache::new(Arc::new(MemoryCache::new()), TTL);
        cache.put_top(10, &[]).await;
        assert_eq!(cache.get_top(10).await, Some(Vec::new()));
    }

    #[tokio::test]
    async fn user_invalidation_only_touches_that_user() {
        let cache = LeaderboardCache::new(Arc::new(MemoryCache::new()), TTL);
        cache.put_user_rank(&entry(1, 50, 1)).await;
        cache.put_user_rank(&entry(2, 30, 2)).await;
        cache.put_top(10, &[entry(1, 50, 1)]).await;

        cache.invalidate_user(1).await.unwrap();
        cache.invalidate_user(1).await.unwrap();

        assert_eq!(cache.get_user_rank(1).await, None);
        assert_eq!(cache.get_user_rank(2).await, Some(entry(2, 30, 2)));
        assert!(cache.get_top(10).await.is_some());
    }

    #[tokio::test]
    async fn undecodable_value_is_treated_as_miss() {
        let backend = Arc::new(MemoryCache::new());
        backend
            .set(&user_key(7), b"not json".to_vec(), TTL)
            .await
            .unwrap();
        let cache = LeaderboardCache::new(backend, TTL);

        assert_eq!(cache.get_user_rank(7).await, None);
    }

    #[tokio::test]
    async fn unreachable_backend_degrades_to_miss() {
        let cache = LeaderboardCache::new(Arc::new(UnreachableCache), TTL);

        cache.put_top(10, &[entry(1, 5, 1)]).await;
        cache.put_user_rank(&entry(1, 5, 1)).await;

        assert_eq!(cache.get_top(10).await, None);
        assert_eq!(cache.get_user_rank(1).await, None);
        assert!(cache.invalidate_user(1).await.is_err());
    }

    #[tokio::test]
    async fn entries_loaded_before_a_generation_bump_are_not_cached() {
        let cache = LeaderboardCache::new(Arc::new(MemoryCache::new()), TTL);
        let generation = cache.top_generation();

        cache.advance_top_generation();
        assert!(!cache.put_top_at(10, &[entry(1, 50, 1)], generation).await);
        assert_eq!(cache.get_top(10).await, None);

        assert!(
            cache
                .put_top_at(10, &[entry(1, 70, 1)], cache.top_generation())
                .await
        );
        assert_eq!(cache.get_top(10).await, Some(vec![entry(1, 70, 1)]));
    }

    #[tokio::test]
    async fn tracks_populated_top_sizes() {
        let cache = LeaderboardCache::new(Arc::new(MemoryCache::new()), TTL);
        cache.put_top(25, &[]).await;
        cache.put_top(10, &[]).await;
        cache.put_top(25, &[]).await;

        assert_eq!(cache.populated_top_sizes(), vec![10, 25]);
    }
}

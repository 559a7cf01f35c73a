pub mod recalculation;

use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    config::AppConfig,
    dao::{cache::CacheBackend, leaderboard_store::LeaderboardStore},
    services::{invalidation::InvalidationCoordinator, leaderboard_cache::LeaderboardCache},
};

use self::recalculation::RecalculationStatus;

pub type SharedState = Arc<AppState>;

/// Central application state holding the store, the cache and the recalculation tracker.
///
/// Built once by the binary and injected into every handler and background task.
pub struct AppState {
    store: Arc<dyn LeaderboardStore>,
    cache: LeaderboardCache,
    coordinator: InvalidationCoordinator,
    recalculation: Arc<RecalculationStatus>,
    config: AppConfig,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The store is expected to be reachable; the application starts healthy.
    pub fn new(
        store: Arc<dyn LeaderboardStore>,
        cache_backend: Arc<dyn CacheBackend>,
        config: AppConfig,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(false);
        let cache = LeaderboardCache::new(cache_backend, config.cache_ttl);
        let recalculation = Arc::new(RecalculationStatus::new());
        let coordinator =
            InvalidationCoordinator::new(cache.clone(), config.top_limit, recalculation.clone());

        Arc::new(Self {
            store,
            cache,
            coordinator,
            recalculation,
            config,
            degraded: degraded_tx,
        })
    }

    /// Authoritative score event and rank store.
    pub fn store(&self) -> Arc<dyn LeaderboardStore> {
        self.store.clone()
    }

    /// Typed leaderboard cache.
    pub fn cache(&self) -> &LeaderboardCache {
        &self.cache
    }

    /// Invalidation rules shared by the submit path and the scheduler.
    pub fn coordinator(&self) -> &InvalidationCoordinator {
        &self.coordinator
    }

    /// Recalculation run tracker.
    pub fn recalculation(&self) -> Arc<RecalculationStatus> {
        self.recalculation.clone()
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}

//! Single-flight, fixed-interval driver of the recalculation engine.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    dao::{leaderboard_store::LeaderboardStore, models::RecalculationSummary},
    services::{invalidation::InvalidationCoordinator, recalculation::RecalculationEngine},
    state::{
        SharedState,
        recalculation::{RecalculationStatus, RunOutcome, RunReport},
    },
};

/// What happened to a single trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A run finished and the top leaderboard cache was invalidated.
    Completed(RecalculationSummary),
    /// A run failed; ranks and cache were left untouched.
    Failed,
    /// Another run held the scheduling lock; this trigger was absorbed.
    AlreadyRunning,
    /// Nothing was submitted since the last run and dirty tracking is enabled.
    Clean,
}

/// Serializes recalculation runs and applies their side effects.
///
/// Only one run can hold the scheduling lock at a time. Request handlers never
/// touch that lock.
pub struct RecalculationScheduler {
    engine: RecalculationEngine,
    coordinator: InvalidationCoordinator,
    status: Arc<RecalculationStatus>,
    gate: Mutex<()>,
    only_when_dirty: bool,
}

impl RecalculationScheduler {
    /// Build a scheduler around its collaborators.
    pub fn new(
        store: Arc<dyn LeaderboardStore>,
        coordinator: InvalidationCoordinator,
        status: Arc<RecalculationStatus>,
        only_when_dirty: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine: RecalculationEngine::new(store),
            coordinator,
            status,
            gate: Mutex::new(()),
            only_when_dirty,
        })
    }

    /// Build a scheduler sharing the store, cache and status of the application state.
    pub fn from_state(state: &SharedState) -> Arc<Self> {
        Self::new(
            state.store(),
            state.coordinator().clone(),
            state.recalculation(),
            state.config().recalculate_only_when_dirty,
        )
    }

    /// Run one recalculation unless another one is already in flight.
    pub async fn trigger(&self) -> TriggerOutcome {
        let Ok(_gate) = self.gate.try_lock() else {
            debug!("recalculation already running; trigger absorbed");
            self.status.record_absorbed().await;
            return TriggerOutcome::AlreadyRunning;
        };

        let was_dirty = self.status.take_dirty();
        if self.only_when_dirty && !was_dirty {
            debug!("no score submitted since last recalculation; skipping");
            self.status.record_skipped().await;
            return TriggerOutcome::Clean;
        }

        self.status.begin_run().await;
        let started_at = SystemTime::now();
        let started = Instant::now();

        let (outcome, trigger_outcome) = match self.engine.recalculate().await {
            Ok(summary) => {
                self.coordinator.on_recalculated().await;
                (
                    RunOutcome::Succeeded {
                        ranked_users: summary.ranked_users,
                        scored_events: summary.scored_events,
                    },
                    TriggerOutcome::Completed(summary),
                )
            }
            Err(err) => {
                // Keep the pending writes visible to the next dirty check.
                if was_dirty {
                    self.status.mark_dirty();
                }
                (
                    RunOutcome::Failed {
                        error: err.to_string(),
                    },
                    TriggerOutcome::Failed,
                )
            }
        };

        self.status
            .finish_run(RunReport {
                outcome,
                started_at,
                duration: started.elapsed(),
            })
            .await;
        trigger_outcome
    }

    /// Start the periodic loop. The first run happens immediately.
    ///
    /// The returned handle is the only way to stop the loop.
    pub fn spawn(self: Arc<Self>, period: Duration) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = period.as_secs(),
                only_when_dirty = self.only_when_dirty,
                "leaderboard recalculation scheduler started"
            );

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        self.trigger().await;
                    }
                }
            }

            info!("leaderboard recalculation scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Owner handle of a running scheduler loop.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop scheduling new runs and wait for an in-flight run to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "recalculation scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use futures::future::BoxFuture;
    use tokio::sync::{Notify, Semaphore};

    use super::*;
    use crate::{
        dao::{
            cache::MemoryCache,
            leaderboard_store::MemoryLeaderboardStore,
            models::{GameMode, RankEntryEntity, ScoreEventEntity, UserId},
            storage::{StorageError, StorageResult},
        },
        services::leaderboard_cache::LeaderboardCache,
        state::recalculation::RunPhase,
    };

    /// Memory store whose recalculation blocks until released and can be made to fail.
    #[derive(Clone)]
    struct GatedStore {
        inner: MemoryLeaderboardStore,
        started: Arc<Notify>,
        release: Arc<Semaphore>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl GatedStore {
        fn new(permits: usize, fail: bool) -> Self {
            Self {
                inner: MemoryLeaderboardStore::new(),
                started: Arc::new(Notify::new()),
                release: Arc::new(Semaphore::new(permits)),
                active: Arc::new(AtomicUsize::new(0)),
                max_active: Arc::new(AtomicUsize::new(0)),
                runs: Arc::new(AtomicUsize::new(0)),
                fail,
            }
        }

        fn open(fail: bool) -> Self {
            Self::new(Semaphore::MAX_PERMITS, fail)
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    impl LeaderboardStore for GatedStore {
        fn append_score_event(
            &self,
            event: ScoreEventEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.append_score_event(event)
        }

        fn recalculate_ranks(&self) -> BoxFuture<'static, StorageResult<RecalculationSummary>> {
            let store = self.clone();
            Box::pin(async move {
                store.runs.fetch_add(1, Ordering::SeqCst);
                let now = store.active.fetch_add(1, Ordering::SeqCst) + 1;
                store.max_active.fetch_max(now, Ordering::SeqCst);
                store.started.notify_one();

                if let Ok(permit) = store.release.acquire().await {
                    permit.forget();
                }
                store.active.fetch_sub(1, Ordering::SeqCst);

                if store.fail {
                    return Err(StorageError::aborted(
                        "simulated write conflict".into(),
                        io::Error::other("write conflict"),
                    ));
                }
                store.inner.recalculate_ranks().await
            })
        }

        fn top_ranks(
            &self,
            limit: usize,
        ) -> BoxFuture<'static, StorageResult<Vec<RankEntryEntity>>> {
            self.inner.top_ranks(limit)
        }

        fn find_rank(
            &self,
            user_id: UserId,
        ) -> BoxFuture<'static, StorageResult<Option<RankEntryEntity>>> {
            self.inner.find_rank(user_id)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    struct Fixture {
        store: GatedStore,
        cache: LeaderboardCache,
        status: Arc<RecalculationStatus>,
        scheduler: Arc<RecalculationScheduler>,
    }

    fn fixture(store: GatedStore, only_when_dirty: bool) -> Fixture {
        let cache = LeaderboardCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(3600));
        let status = Arc::new(RecalculationStatus::new());
        let coordinator = InvalidationCoordinator::new(cache.clone(), 10, status.clone());
        let scheduler = RecalculationScheduler::new(
            Arc::new(store.clone()),
            coordinator,
            status.clone(),
            only_when_dirty,
        );
        Fixture {
            store,
            cache,
            status,
            scheduler,
        }
    }

    #[tokio::test]
    async fn overlapping_triggers_never_run_concurrently() {
        let Fixture {
            store, scheduler, ..
        } = fixture(GatedStore::new(0, false), false);

        let first = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.trigger().await }
        });
        store.started.notified().await;

        assert_eq!(scheduler.trigger().await, TriggerOutcome::AlreadyRunning);

        store.release.add_permits(1);
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Completed(_)));

        assert_eq!(store.runs(), 1);
        assert_eq!(store.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.status.snapshot().await.absorbed, 1);
    }

    #[tokio::test]
    async fn sequential_triggers_each_run() {
        let Fixture {
            store, scheduler, ..
        } = fixture(GatedStore::open(false), false);

        scheduler.trigger().await;
        scheduler.trigger().await;

        assert_eq!(store.runs(), 2);
        assert_eq!(store.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_invalidates_top_cache() {
        let Fixture {
            cache, scheduler, ..
        } = fixture(GatedStore::open(false), false);
        cache.put_top(10, &[]).await;

        assert!(matches!(
            scheduler.trigger().await,
            TriggerOutcome::Completed(_)
        ));
        assert_eq!(cache.get_top(10).await, None);
    }

    #[tokio::test]
    async fn failure_keeps_cache_and_is_recorded() {
        let Fixture {
            cache,
            status,
            scheduler,
            ..
        } = fixture(GatedStore::open(true), false);
        cache.put_top(10, &[]).await;

        assert_eq!(scheduler.trigger().await, TriggerOutcome::Failed);
        assert_eq!(cache.get_top(10).await, Some(Vec::new()));

        let snapshot = status.snapshot().await;
        assert_eq!(snapshot.phase, RunPhase::Idle);
        assert_eq!(snapshot.failed, 1);
        assert!(snapshot.dirty);
        assert!(matches!(
            snapshot.last_run.map(|run| run.outcome),
            Some(RunOutcome::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn clean_leaderboard_is_skipped_when_dirty_tracking_enabled() {
        let Fixture {
            store,
            status,
            scheduler,
            ..
        } = fixture(GatedStore::open(false), true);

        assert!(matches!(
            scheduler.trigger().await,
            TriggerOutcome::Completed(_)
        ));
        assert_eq!(scheduler.trigger().await, TriggerOutcome::Clean);
        assert_eq!(store.runs(), 1);

        store
            .append_score_event(ScoreEventEntity::now(1, 5, GameMode::Solo))
            .await
            .unwrap();
        status.mark_dirty();
        assert!(matches!(
            scheduler.trigger().await,
            TriggerOutcome::Completed(_)
        ));
        assert_eq!(store.runs(), 2);
        assert_eq!(status.snapshot().await.skipped, 1);
    }

    #[tokio::test]
    async fn clean_leaderboard_still_runs_by_default() {
        let Fixture {
            store, scheduler, ..
        } = fixture(GatedStore::open(false), false);

        scheduler.trigger().await;
        scheduler.trigger().await;
        assert_eq!(store.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_runs_on_interval_and_stops_on_shutdown() {
        let Fixture {
            store, scheduler, ..
        } = fixture(GatedStore::open(false), false);

        let handle = scheduler.spawn(Duration::from_secs(60));
        store.started.notified().await;
        assert_eq!(store.runs(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.runs(), 2);

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(store.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_lets_in_flight_run_finish() {
        let Fixture {
            store,
            status,
            scheduler,
            ..
        } = fixture(GatedStore::new(0, false), false);

        let handle = scheduler.spawn(Duration::from_secs(60));
        store.started.notified().await;

        let shutdown = tokio::spawn(handle.shutdown());
        tokio::task::yield_now().await;
        assert!(!shutdown.is_finished());

        store.release.add_permits(1);
        shutdown.await.unwrap();

        let snapshot = status.snapshot().await;
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(store.runs(), 1);
    }
}

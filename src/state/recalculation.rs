//! Bookkeeping of recalculation runs shared between the scheduler and status readers.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, SystemTime},
};

use tokio::sync::RwLock;

/// Lifecycle phase of the recalculation actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    /// Waiting for the next trigger.
    #[default]
    Idle,
    /// A recalculation is in flight.
    Running,
}

/// Result of a finished recalculation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Ranks were rewritten and the top leaderboard cache invalidated.
    Succeeded {
        ranked_users: usize,
        scored_events: u64,
    },
    /// The transaction was rolled back; previous ranks remain in place.
    Failed { error: String },
}

/// Timing and outcome of the last finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub started_at: SystemTime,
    pub duration: Duration,
}

/// Point-in-time copy of the recalculation status.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub phase: RunPhase,
    pub last_run: Option<RunReport>,
    pub last_success_at: Option<SystemTime>,
    pub succeeded: u64,
    pub failed: u64,
    /// Ticks skipped because nothing was submitted since the last run.
    pub skipped: u64,
    /// Triggers absorbed because a run was already in flight.
    pub absorbed: u64,
    /// Whether scores were submitted since the last run started.
    pub dirty: bool,
}

/// Shared run tracker plus the "scores pending" flag.
pub struct RecalculationStatus {
    inner: RwLock<StatusSnapshot>,
    dirty: AtomicBool,
}

impl Default for RecalculationStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl RecalculationStatus {
    /// Create a tracker in the idle phase. The leaderboard starts dirty so the
    /// first run always happens.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StatusSnapshot::default()),
            dirty: AtomicBool::new(true),
        }
    }

    /// Record that a score was committed since the last run.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Clear the dirty flag, returning its previous value.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Whether scores were submitted since the last run started.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Enter the running phase.
    pub async fn begin_run(&self) {
        self.inner.write().await.phase = RunPhase::Running;
    }

    /// Leave the running phase and record the run.
    pub async fn finish_run(&self, report: RunReport) {
        let mut guard = self.inner.write().await;
        guard.phase = RunPhase::Idle;
        match &report.outcome {
            RunOutcome::Succeeded { .. } => {
                guard.succeeded += 1;
                guard.last_success_at = Some(report.started_at);
            }
            RunOutcome::Failed { .. } => guard.failed += 1,
        }
        guard.last_run = Some(report);
    }

    /// Count a tick skipped on a clean leaderboard.
    pub async fn record_skipped(&self) {
        self.inner.write().await.skipped += 1;
    }

    /// Count a trigger absorbed by an in-flight run.
    pub async fn record_absorbed(&self) {
        self.inner.write().await.absorbed += 1;
    }

    /// Copy the current status.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let mut snapshot = self.inner.read().await.clone();
        snapshot.dirty = self.is_dirty();
        snapshot
    }
}

//! Scheduler B: periodic durability sweep.
//!
//! Each sweep reclaims stale `publishing` claims that no attempt in this
//! process still holds, then attempts every overdue `scheduled` post.
//! Attempts share one semaphore across overlapping sweeps, so a slow upload
//! holds a single permit while later ticks keep serving other due posts.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::config::SchedulerConfig;
use crate::core::audit::{ActivityAction, ActivityEvent, Trigger};
use crate::core::coordinator::{AttemptOutcome, PublicationCoordinator};
use crate::core::error::{RepositoryError, ORPHANED_CLAIM_MESSAGE};
use crate::util::PostId;

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Overdue posts returned by the due query.
    pub due_found: usize,
    /// Due posts skipped because an earlier sweep is still attempting them.
    pub skipped_in_flight: usize,
    /// Attempts that published.
    pub published: usize,
    /// Attempts that failed.
    pub failed: usize,
    /// Attempts that lost the claim.
    pub claim_lost: usize,
    /// Attempts that hit a repository error or whose task died.
    pub errors: usize,
    /// Stale `publishing` posts moved to `failed`.
    pub orphans_reclaimed: usize,
}

/// Cumulative sweep statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepStats {
    /// Completed sweeps since creation.
    pub sweeps_completed: u64,
    /// When the last sweep finished.
    pub last_sweep_at: Option<DateTime<Utc>>,
    /// Report of the last sweep.
    pub last_report: Option<SweepReport>,
}

struct InFlight {
    posts: Arc<Mutex<HashSet<PostId>>>,
    post_id: PostId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.posts.lock().remove(&self.post_id);
    }
}

/// Durability sweep over the repository.
pub struct SweepScheduler {
    coordinator: Arc<PublicationCoordinator>,
    config: SchedulerConfig,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<PostId>>>,
    stats: Mutex<SweepStats>,
    wake: Notify,
}

impl SweepScheduler {
    /// Create a sweep with `config.sweep_concurrency` attempt permits.
    pub fn new(coordinator: Arc<PublicationCoordinator>, config: SchedulerConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.sweep_concurrency.max(1))),
            coordinator,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            stats: Mutex::new(SweepStats::default()),
            wake: Notify::new(),
        }
    }

    /// Scheduler settings in use.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Snapshot of cumulative statistics.
    pub fn stats(&self) -> SweepStats {
        self.stats.lock().clone()
    }

    /// Posts currently being attempted by a sweep.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Ask the running loop to sweep now instead of waiting for the next tick.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    /// Run one sweep to completion.
    pub async fn sweep_once(&self) -> Result<SweepReport, RepositoryError> {
        let mut report = SweepReport::default();
        let repository = Arc::clone(self.coordinator.repository());
        let now = self.coordinator.clock().now();

        let cutoff = now
            .checked_sub_signed(self.config.stuck_threshold())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let live = self.coordinator.live_claims();
        for orphan in repository
            .reclaim_orphans(cutoff, &live, ORPHANED_CLAIM_MESSAGE, now)
            .await?
        {
            let age = orphan
                .claimed_at
                .map_or(0, |claimed| (now - claimed).num_seconds());
            tracing::warn!(
                "post {} reclaimed from publishing after {}s without resolution",
                orphan.id,
                age
            );
            self.coordinator.record(
                ActivityEvent::new(orphan.id, ActivityAction::OrphanReclaimed, now)
                    .with_trigger(Trigger::Sweep)
                    .with_detail(format!("{ORPHANED_CLAIM_MESSAGE}; claim age {age}s")),
            );
            report.orphans_reclaimed += 1;
        }

        let due = repository
            .due_posts(now, self.config.sweep_batch_limit)
            .await?;
        report.due_found = due.len();

        let mut attempts = JoinSet::new();
        for post in due {
            if !self.in_flight.lock().insert(post.id) {
                report.skipped_in_flight += 1;
                continue;
            }
            let guard = InFlight {
                posts: Arc::clone(&self.in_flight),
                post_id: post.id,
            };
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                break;
            };
            let coordinator = Arc::clone(&self.coordinator);
            attempts.spawn(async move {
                let _guard = guard;
                let _permit = permit;
                coordinator.attempt_publish(post.id, Trigger::Sweep).await
            });
        }

        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(Ok(AttemptOutcome::Published { .. })) => report.published += 1,
                Ok(Ok(AttemptOutcome::Failed { .. })) => report.failed += 1,
                Ok(Ok(AttemptOutcome::ClaimLost)) => report.claim_lost += 1,
                Ok(Err(err)) => {
                    tracing::warn!("sweep attempt hit a repository error: {}", err);
                    report.errors += 1;
                }
                Err(err) => {
                    tracing::warn!("sweep attempt task ended abnormally: {}", err);
                    report.errors += 1;
                }
            }
        }

        if report.due_found > 0 || report.orphans_reclaimed > 0 {
            tracing::info!(
                "sweep: {} due, {} published, {} failed, {} claim lost, {} orphans reclaimed",
                report.due_found,
                report.published,
                report.failed,
                report.claim_lost,
                report.orphans_reclaimed
            );
        } else {
            tracing::debug!("sweep: nothing due");
        }

        let mut stats = self.stats.lock();
        stats.sweeps_completed += 1;
        stats.last_sweep_at = Some(self.coordinator.clock().now());
        stats.last_report = Some(report.clone());
        Ok(report)
    }

    /// Start the periodic loop. It stops when `shutdown` flips to `true` or its sender drops.
    ///
    /// Each tick runs its sweep as a separate task, so a long batch never
    /// delays the next tick. In-flight attempts are left to finish on their own.
    pub fn spawn(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.sweep_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(
                "sweep loop started; interval {:?}",
                this.config.sweep_interval()
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = this.wake.notified() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                let sweeper = Arc::clone(&this);
                tokio::spawn(async move {
                    if let Err(err) = sweeper.sweep_once().await {
                        tracing::warn!("sweep failed: {}", err);
                    }
                });
            }
            tracing::info!("sweep loop stopped");
        })
    }
}

//! Publishing service: the exposed scheduling surface.
//!
//! Wires the coordinator to both schedulers. Callers may only move posts
//! into `scheduled` (or cancel/remove them); every other transition goes
//! through the coordinator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::core::audit::{ActivityAction, ActivityEvent, Trigger};
use crate::core::coordinator::{AttemptOutcome, PublicationCoordinator};
use crate::core::error::{PublishError, RepositoryError, ServiceError};
use crate::core::post::{Post, PostStatus};
use crate::core::precise::PreciseScheduler;
use crate::core::sweep::{SweepReport, SweepScheduler};
use crate::runtime::api::{PostStatusResponse, SchedulerStatus};
use crate::util::PostId;

/// Dual-scheduler publishing service.
pub struct PublishingService {
    coordinator: Arc<PublicationCoordinator>,
    precise: PreciseScheduler,
    sweep: Arc<SweepScheduler>,
    shutdown: watch::Sender<bool>,
    sweep_loop: Mutex<Option<JoinHandle<()>>>,
}

impl PublishingService {
    /// Create a stopped service.
    pub fn new(coordinator: Arc<PublicationCoordinator>, scheduler: SchedulerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            precise: PreciseScheduler::new(Arc::clone(&coordinator)),
            sweep: Arc::new(SweepScheduler::new(Arc::clone(&coordinator), scheduler)),
            coordinator,
            shutdown,
            sweep_loop: Mutex::new(None),
        }
    }

    /// Shared coordinator.
    pub fn coordinator(&self) -> &Arc<PublicationCoordinator> {
        &self.coordinator
    }

    /// Current time from the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.coordinator.clock().now()
    }

    /// Re-arm timers for persisted future posts and start the sweep loop.
    ///
    /// Returns the number of timers armed. Calling `start` on a running
    /// service only re-arms timers.
    pub async fn start(&self) -> Result<usize, ServiceError> {
        let now = self.now();
        let mut armed = 0;
        for post in self
            .coordinator
            .repository()
            .list_by_status(PostStatus::Scheduled)
            .await?
        {
            if let Some(at) = post.scheduled_for.filter(|at| *at > now) {
                if self.precise.arm(post.id, at) {
                    armed += 1;
                }
            }
        }

        let mut sweep_loop = self.sweep_loop.lock();
        if sweep_loop.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(armed);
        }
        self.shutdown.send_replace(false);
        *sweep_loop = Some(self.sweep.spawn(self.shutdown.subscribe()));
        tracing::info!("publishing service started; {} timers re-armed", armed);
        Ok(armed)
    }

    /// Stop the sweep loop and cancel all timers. In-flight attempts run to completion.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.precise.cancel_all();
        let handle = self.sweep_loop.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!("sweep loop ended abnormally: {}", err);
            }
        }
        tracing::info!("publishing service stopped");
    }

    /// Persist `post` as scheduled at its `scheduled_for` and register it with the timers.
    ///
    /// Scheduling an existing post with the same content only moves its due
    /// time; different content is refused with
    /// [`ServiceError::ContentConflict`]. Overdue posts are handed to the
    /// sweep instead of a timer.
    pub async fn schedule(&self, mut post: Post) -> Result<Post, ServiceError> {
        let at = post
            .scheduled_for
            .ok_or(ServiceError::MissingScheduleTime(post.id))?;
        let now = self.now();
        let repository = self.coordinator.repository();
        let stored = if let Some(existing) = repository.get(post.id).await? {
            if !existing.same_payload(&post) {
                return Err(ServiceError::ContentConflict(post.id));
            }
            repository.schedule(post.id, at, now).await?
        } else {
            post.status = PostStatus::Scheduled;
            post.updated_at = now;
            repository.insert(post).await?
        };
        self.register(&stored, now);
        Ok(stored)
    }

    /// Move an existing post to a new due time, replacing its timer.
    pub async fn reschedule(
        &self,
        post_id: PostId,
        at: DateTime<Utc>,
    ) -> Result<Post, ServiceError> {
        let now = self.now();
        let stored = self
            .coordinator
            .repository()
            .schedule(post_id, at, now)
            .await?;
        self.register(&stored, now);
        Ok(stored)
    }

    /// Best-effort cancel. Returns `false` once the post is publishing or resolved.
    pub async fn cancel(&self, post_id: PostId) -> Result<bool, ServiceError> {
        self.precise.cancel(post_id);
        let now = self.now();
        let cancelled = self.coordinator.repository().cancel(post_id, now).await?;
        if cancelled {
            tracing::info!("post {} cancelled", post_id);
            self.coordinator
                .record(ActivityEvent::new(post_id, ActivityAction::Cancelled, now));
        } else {
            tracing::debug!("post {} not cancellable in its current state", post_id);
        }
        Ok(cancelled)
    }

    /// Remove a post and its timer. Posts being published are kept.
    pub async fn delete(&self, post_id: PostId) -> Result<bool, ServiceError> {
        self.precise.cancel(post_id);
        Ok(self.coordinator.repository().delete(post_id).await?)
    }

    /// Run a sweep now and wait for it.
    pub async fn force_check(&self) -> Result<SweepReport, ServiceError> {
        Ok(self.sweep.sweep_once().await?)
    }

    /// Attempt a post immediately, outside both schedulers.
    pub async fn publish_now(&self, post_id: PostId) -> Result<AttemptOutcome, ServiceError> {
        Ok(self
            .coordinator
            .attempt_publish(post_id, Trigger::Manual)
            .await?)
    }

    /// Scheduler liveness.
    pub fn get_status(&self) -> SchedulerStatus {
        let stats = self.sweep.stats();
        SchedulerStatus {
            running: self
                .sweep_loop
                .lock()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished()),
            armed_timers: self.precise.armed(),
            next_timer_due: self.precise.next_due(),
            sweep_interval_secs: self.sweep.config().sweep_interval_secs,
            sweeps_completed: stats.sweeps_completed,
            last_sweep_at: stats.last_sweep_at,
            last_sweep: stats.last_report,
            posts_in_flight: self.coordinator.in_flight(),
        }
    }

    /// Status of one post.
    pub async fn post_status(&self, post_id: PostId) -> Result<PostStatusResponse, ServiceError> {
        let post = self
            .coordinator
            .repository()
            .get(post_id)
            .await?
            .ok_or(RepositoryError::NotFound(post_id))?;
        Ok(PostStatusResponse::from(&post))
    }

    /// Check platform credentials.
    pub async fn verify_connection(&self) -> Result<(), PublishError> {
        self.coordinator.adapter().verify_connection().await
    }

    fn register(&self, post: &Post, now: DateTime<Utc>) {
        let Some(at) = post.scheduled_for else {
            return;
        };
        if self.precise.arm(post.id, at) {
            tracing::info!("post {} scheduled for {}", post.id, at);
        } else {
            tracing::info!("post {} is already due ({}); nudging the sweep", post.id, at);
            self.sweep.trigger();
        }
        self.coordinator.record(
            ActivityEvent::new(post.id, ActivityAction::Scheduled, now)
                .with_detail(at.to_rfc3339()),
        );
    }
}

impl Drop for PublishingService {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

//! Scheduler A: one-shot timers that fire at a post's due time.
//!
//! Timers live in a single owned map keyed by post id. Arming replaces and
//! aborts any previous timer for the same post; every entry carries a
//! generation so a timer that lost a replace race never fires. Timers do not
//! survive a restart; the sweep covers that.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::core::audit::Trigger;
use crate::core::coordinator::PublicationCoordinator;
use crate::core::post::PostStatus;
use crate::util::{to_std_duration, PostId};

struct TimerEntry {
    generation: u64,
    due: DateTime<Utc>,
    handle: JoinHandle<()>,
}

type TimerMap = Arc<Mutex<HashMap<PostId, TimerEntry>>>;

/// In-process precise scheduler.
pub struct PreciseScheduler {
    coordinator: Arc<PublicationCoordinator>,
    timers: TimerMap,
    generations: AtomicU64,
}

impl PreciseScheduler {
    /// Create a scheduler with no armed timers.
    pub fn new(coordinator: Arc<PublicationCoordinator>) -> Self {
        Self {
            coordinator,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    /// Arm (or re-arm) the timer for `post_id` to fire at `due`.
    ///
    /// Returns `false` without arming when `due` is not in the future; any
    /// previous timer for the post is cancelled either way. Must be called
    /// from within a Tokio runtime.
    pub fn arm(&self, post_id: PostId, due: DateTime<Utc>) -> bool {
        let now = self.coordinator.clock().now();
        if due <= now {
            self.cancel(post_id);
            return false;
        }
        let delay = to_std_duration(due - now);
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);

        let mut timers = self.timers.lock();
        let handle = tokio::spawn(fire(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.timers),
            post_id,
            generation,
            due,
            delay,
        ));
        if let Some(previous) = timers.insert(
            post_id,
            TimerEntry {
                generation,
                due,
                handle,
            },
        ) {
            previous.handle.abort();
        }
        tracing::debug!("post {} timer armed for {} (in {:?})", post_id, due, delay);
        true
    }

    /// Cancel the timer for `post_id`. Returns whether one was armed.
    pub fn cancel(&self, post_id: PostId) -> bool {
        self.timers.lock().remove(&post_id).is_some_and(|entry| {
            entry.handle.abort();
            tracing::debug!("post {} timer cancelled", post_id);
            true
        })
    }

    /// Cancel every armed timer.
    pub fn cancel_all(&self) {
        for (_, entry) in self.timers.lock().drain() {
            entry.handle.abort();
        }
    }

    /// Number of armed timers.
    pub fn armed(&self) -> usize {
        self.timers.lock().len()
    }

    /// Due time of the timer for `post_id`, if armed.
    pub fn armed_for(&self, post_id: PostId) -> Option<DateTime<Utc>> {
        self.timers.lock().get(&post_id).map(|entry| entry.due)
    }

    /// Earliest armed due time.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.timers.lock().values().map(|entry| entry.due).min()
    }
}

impl Drop for PreciseScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn fire(
    coordinator: Arc<PublicationCoordinator>,
    timers: TimerMap,
    post_id: PostId,
    generation: u64,
    due: DateTime<Utc>,
    delay: std::time::Duration,
) {
    tokio::time::sleep(delay).await;

    {
        let mut timers = timers.lock();
        match timers.get(&post_id) {
            Some(entry) if entry.generation == generation => {
                timers.remove(&post_id);
            }
            _ => {
                tracing::debug!("post {} stale timer generation {} skipped", post_id, generation);
                return;
            }
        }
    }

    match coordinator.repository().get(post_id).await {
        Ok(Some(post))
            if post.status == PostStatus::Scheduled && post.scheduled_for == Some(due) => {}
        Ok(_) => {
            tracing::debug!("post {} no longer due at {}; timer skipped", post_id, due);
            return;
        }
        Err(err) => {
            tracing::warn!("post {} timer could not load post: {}", post_id, err);
            return;
        }
    }

    if let Err(err) = coordinator
        .attempt_publish(post_id, Trigger::PreciseTimer)
        .await
    {
        tracing::warn!("post {} timer attempt failed: {}", post_id, err);
    }
}

//! Activity log sinks.
//!
//! Provides the fire-and-forget [`ActivityLog`] port, a bounded in-memory
//! sink for tests and dev, and a sink that forwards events to `tracing`.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::ActivityLogError;
use crate::util::PostId;

/// What happened to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    /// Caller scheduled the post.
    Scheduled,
    /// Caller cancelled the post.
    Cancelled,
    /// A coordinator invocation won the claim.
    Claimed,
    /// A coordinator invocation lost the claim; no mutation was made.
    RacePrevented,
    /// The platform accepted the post.
    Published,
    /// The attempt failed.
    Failed,
    /// The sweep failed a stale `publishing` claim.
    OrphanReclaimed,
}

impl ActivityAction {
    /// Lowercase wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Cancelled => "cancelled",
            Self::Claimed => "claimed",
            Self::RacePrevented => "race_prevented",
            Self::Published => "published",
            Self::Failed => "failed",
            Self::OrphanReclaimed => "orphan_reclaimed",
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which actor invoked the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Scheduler A's one-shot timer.
    PreciseTimer,
    /// Scheduler B's periodic sweep.
    Sweep,
    /// Direct call (operational hook, tests).
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PreciseTimer => "precise_timer",
            Self::Sweep => "sweep",
            Self::Manual => "manual",
        })
    }
}

/// Activity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Event identifier.
    pub event_id: Uuid,
    /// Related post.
    pub post_id: PostId,
    /// Action taken.
    pub action: ActivityAction,
    /// Invoking actor, when the event comes from an attempt.
    pub trigger: Option<Trigger>,
    /// Seconds between the due time and the event (positive = late).
    pub delay_secs: Option<i64>,
    /// Additional context (external id, error message, ...).
    pub detail: Option<String>,
    /// Event time.
    pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
    /// Build an event stamped at `at`.
    pub fn new(post_id: PostId, action: ActivityAction, at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            post_id,
            action,
            trigger: None,
            delay_secs: None,
            detail: None,
            created_at: at,
        }
    }

    /// Attach the invoking actor.
    #[must_use]
    pub const fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Attach the elapsed delay relative to `scheduled_for`.
    #[must_use]
    pub fn with_delay_from(mut self, scheduled_for: Option<DateTime<Utc>>) -> Self {
        self.delay_secs = scheduled_for.map(|due| (self.created_at - due).num_seconds());
        self
    }

    /// Attach free-form detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Activity log abstraction. Fire-and-forget: callers log and drop errors.
pub trait ActivityLog: Send + Sync {
    /// Record an activity event.
    fn record(&self, event: ActivityEvent) -> Result<(), ActivityLogError>;
}

/// In-memory activity log for testing and dev, bounded like a ring buffer.
pub struct InMemoryActivityLog {
    events: Mutex<VecDeque<ActivityEvent>>,
    max_events: usize,
}

impl InMemoryActivityLog {
    /// Create a new in-memory log with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events for one post with a given action.
    pub fn count(&self, post_id: PostId, action: ActivityAction) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.post_id == post_id && e.action == action)
            .count()
    }
}

impl Default for InMemoryActivityLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl ActivityLog for InMemoryActivityLog {
    fn record(&self, event: ActivityEvent) -> Result<(), ActivityLogError> {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}

/// Forwards every event to `tracing` under the `activity` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivityLog;

impl ActivityLog for TracingActivityLog {
    fn record(&self, event: ActivityEvent) -> Result<(), ActivityLogError> {
        tracing::info!(
            target: "activity",
            event_id = %event.event_id,
            post_id = event.post_id,
            action = %event.action,
            trigger = ?event.trigger,
            delay_secs = ?event.delay_secs,
            detail = ?event.detail,
            "activity"
        );
        Ok(())
    }
}

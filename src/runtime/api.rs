//! API-facing request/response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::ServiceError;
use crate::core::post::{Post, PostStatus};
use crate::core::sweep::SweepReport;
use crate::runtime::service::PublishingService;
use crate::util::PostId;

/// Scheduling request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Post identifier.
    pub post_id: PostId,
    /// Body text.
    pub content: String,
    /// Optional title.
    #[serde(default)]
    pub title: Option<String>,
    /// Optional media reference.
    #[serde(default)]
    pub media_ref: Option<String>,
    /// Due time.
    pub scheduled_for: DateTime<Utc>,
}

/// Post status response. `error_message` is surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStatusResponse {
    /// Post identifier.
    pub post_id: PostId,
    /// Current status.
    pub status: PostStatus,
    /// Due time while scheduled or publishing.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Platform id after success.
    pub external_post_id: Option<String>,
    /// Failure reason after failure.
    pub error_message: Option<String>,
    /// Publication time after success.
    pub published_at: Option<DateTime<Utc>>,
}

impl From<&Post> for PostStatusResponse {
    fn from(post: &Post) -> Self {
        Self {
            post_id: post.id,
            status: post.status,
            scheduled_for: post.scheduled_for,
            external_post_id: post.external_post_id.clone(),
            error_message: post.error_message.clone(),
            published_at: post.published_at,
        }
    }
}

/// Scheduler liveness snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Whether the sweep loop is running.
    pub running: bool,
    /// Armed precise timers.
    pub armed_timers: usize,
    /// Earliest armed timer.
    pub next_timer_due: Option<DateTime<Utc>>,
    /// Sweep period in seconds.
    pub sweep_interval_secs: u64,
    /// Sweeps completed since start.
    pub sweeps_completed: u64,
    /// When the last sweep finished.
    pub last_sweep_at: Option<DateTime<Utc>>,
    /// Report of the last sweep.
    pub last_sweep: Option<SweepReport>,
    /// Posts claimed by this process and not yet resolved.
    pub posts_in_flight: usize,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Scheduler details.
    pub scheduler: SchedulerStatus,
}

/// Health payload: healthy while the sweep loop runs.
pub fn health(service: &PublishingService) -> Health {
    let scheduler = service.get_status();
    Health {
        ok: scheduler.running,
        scheduler,
    }
}

/// Schedule a new post from a request, or move an existing one with the same content.
pub async fn schedule_post(
    service: &PublishingService,
    req: ScheduleRequest,
) -> Result<PostStatusResponse, ServiceError> {
    let mut post = Post::new(req.post_id, req.content, service.now()).due_at(req.scheduled_for);
    post.title = req.title;
    post.media_ref = req.media_ref;
    let stored = service.schedule(post).await?;
    Ok(PostStatusResponse::from(&stored))
}

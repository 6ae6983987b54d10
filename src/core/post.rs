//! The post entity and its status state machine.
//!
//! Transition rules live here as pure methods so every repository backend
//! applies the same conditional semantics inside its own atomic section.
//! Each method returns whether the conditional update "affected the row".

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::PostId;

/// Lifecycle status of a post. This single field is the concurrency linchpin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    /// Authored, not scheduled.
    Draft,
    /// Waiting for its due time.
    Scheduled,
    /// Claimed by exactly one coordinator invocation; transient.
    Publishing,
    /// Delivered to the platform.
    Published,
    /// Attempt failed or claim was orphaned.
    Failed,
}

impl PostStatus {
    /// Terminal outcome of a scheduling attempt.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Failed)
    }

    /// Statuses from which a caller may (re)schedule.
    pub const fn is_schedulable(self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled | Self::Failed)
    }

    /// Lowercase wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of work: one post to be delivered to a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Stable identifier.
    pub id: PostId,
    /// Authoritative lifecycle status.
    pub status: PostStatus,
    /// Due time; non-null only while scheduled or publishing.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Optional title passed as publish metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Body text / description. Opaque to the coordinator.
    pub content: String,
    /// Reference to the media payload, resolved by a `MediaResolver`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<String>,
    /// Platform-assigned id; set only on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_post_id: Option<String>,
    /// Failure reason; set only on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Publication time; set only on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// When the current/last claim was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    /// Token of the current/last claim; resolve is predicated on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_token: Option<Uuid>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Outcome written back by the coordinator's resolve step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The platform accepted the post.
    Published {
        /// Platform-assigned id.
        external_id: String,
        /// Publication time.
        published_at: DateTime<Utc>,
    },
    /// The attempt failed; `error` is recorded verbatim.
    Failed {
        /// Failure reason.
        error: String,
    },
}

impl Post {
    /// New draft post.
    pub fn new(id: PostId, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: PostStatus::Draft,
            scheduled_for: None,
            title: None,
            content: content.into(),
            media_ref: None,
            external_post_id: None,
            error_message: None,
            published_at: None,
            claimed_at: None,
            claim_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a media reference.
    #[must_use]
    pub fn with_media(mut self, media_ref: impl Into<String>) -> Self {
        self.media_ref = Some(media_ref.into());
        self
    }

    /// Attach a title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the desired due time without changing status; used with `schedule`.
    #[must_use]
    pub fn due_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    /// Whether `other` carries the same content, title, and media.
    pub fn same_payload(&self, other: &Self) -> bool {
        self.content == other.content
            && self.title == other.title
            && self.media_ref == other.media_ref
    }

    /// Overdue: scheduled with a due time at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PostStatus::Scheduled && self.scheduled_for.is_some_and(|at| at <= now)
    }

    /// Move to `scheduled` at `at`. Allowed from draft, scheduled, and failed.
    pub fn apply_schedule(&mut self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if !self.status.is_schedulable() {
            return false;
        }
        self.status = PostStatus::Scheduled;
        self.scheduled_for = Some(at);
        self.error_message = None;
        self.claimed_at = None;
        self.claim_token = None;
        self.updated_at = now;
        true
    }

    /// `scheduled` → `draft`. No-op once publishing or resolved.
    pub fn apply_cancel(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != PostStatus::Scheduled {
            return false;
        }
        self.status = PostStatus::Draft;
        self.scheduled_for = None;
        self.updated_at = now;
        true
    }

    /// The claim: `scheduled` → `publishing`, conditioned on current status.
    pub fn apply_claim(&mut self, token: Uuid, now: DateTime<Utc>) -> bool {
        if self.status != PostStatus::Scheduled {
            return false;
        }
        self.status = PostStatus::Publishing;
        self.claimed_at = Some(now);
        self.claim_token = Some(token);
        self.updated_at = now;
        true
    }

    /// Resolve the claim identified by `token`.
    ///
    /// A reclaimed orphan keeps its token, so a late success still lands as
    /// `published`; a post that was rescheduled since has a fresh (empty)
    /// token and is left untouched.
    pub fn apply_resolution(
        &mut self,
        token: Uuid,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> bool {
        if self.claim_token != Some(token) {
            return false;
        }
        if !matches!(self.status, PostStatus::Publishing | PostStatus::Failed) {
            return false;
        }
        match resolution {
            Resolution::Published {
                external_id,
                published_at,
            } => {
                self.status = PostStatus::Published;
                self.external_post_id = Some(external_id.clone());
                self.published_at = Some(*published_at);
                self.error_message = None;
            }
            Resolution::Failed { error } => {
                if self.status == PostStatus::Failed {
                    // already reclaimed; keep the orphan message
                    return false;
                }
                self.status = PostStatus::Failed;
                self.error_message = Some(error.clone());
            }
        }
        self.scheduled_for = None;
        self.updated_at = now;
        true
    }

    /// `publishing` → `failed` when the claim is older than `claimed_before`.
    pub fn apply_orphan_reclaim(
        &mut self,
        claimed_before: DateTime<Utc>,
        message: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if self.status != PostStatus::Publishing {
            return false;
        }
        if !self.claimed_at.is_some_and(|at| at < claimed_before) {
            return false;
        }
        self.status = PostStatus::Failed;
        self.error_message = Some(message.to_string());
        self.scheduled_for = None;
        self.updated_at = now;
        true
    }
}

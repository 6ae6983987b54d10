//! Persistence port for posts.
//!
//! The store is the single source of truth. Every status change is a
//! conditional update; "zero rows affected" is reported as `false` / `None`
//! rather than as an error, because losing a race is an expected outcome.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::error::RepositoryError;
use crate::core::post::{Post, PostStatus, Resolution};
use crate::util::PostId;

/// CRUD and conditional-update operations over posts.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Create a post. Only `draft` or `scheduled` posts may be created.
    async fn insert(&self, post: Post) -> Result<Post, RepositoryError>;

    /// Fetch a post by id.
    async fn get(&self, id: PostId) -> Result<Option<Post>, RepositoryError>;

    /// All posts currently in `status`.
    async fn list_by_status(&self, status: PostStatus) -> Result<Vec<Post>, RepositoryError>;

    /// Move a draft, scheduled, or failed post to `scheduled` at `at`.
    async fn schedule(
        &self,
        id: PostId,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Post, RepositoryError>;

    /// Conditional `scheduled` → `draft`. Returns whether the row changed.
    async fn cancel(&self, id: PostId, now: DateTime<Utc>) -> Result<bool, RepositoryError>;

    /// Remove a post. Posts in `publishing` are never removed.
    async fn delete(&self, id: PostId) -> Result<bool, RepositoryError>;

    /// The claim, equivalent to
    /// `UPDATE .. SET status='publishing' WHERE id=:id AND status='scheduled' RETURNING *`.
    ///
    /// `None` means another invocation already owns the post.
    async fn claim(
        &self,
        id: PostId,
        token: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>, RepositoryError>;

    /// Write the attempt's outcome, predicated on `id` and the claim `token`.
    async fn resolve(
        &self,
        id: PostId,
        token: Uuid,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Scheduled posts due at or before `now`, earliest first, at most `limit`.
    async fn due_posts(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Post>, RepositoryError>;

    /// Fail every `publishing` post claimed before `claimed_before`, except the
    /// `live` ids the caller is still attempting; returns the reclaimed rows.
    async fn reclaim_orphans(
        &self,
        claimed_before: DateTime<Utc>,
        live: &[PostId],
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Post>, RepositoryError>;
}

/// Insert-time policy shared by backends: outsiders may only create drafts or scheduled posts.
///
/// Only scheduled posts carry a due time.
pub(crate) fn check_insertable(post: &Post) -> Result<(), RepositoryError> {
    match post.status {
        PostStatus::Draft if post.scheduled_for.is_none() => Ok(()),
        PostStatus::Draft => Err(RepositoryError::DraftWithDueTime(post.id)),
        PostStatus::Scheduled if post.scheduled_for.is_some() => Ok(()),
        other => Err(RepositoryError::InvalidTransition {
            id: post.id,
            from: PostStatus::Draft,
            to: other,
        }),
    }
}

/// Due posts ordered by due time, then id.
pub(crate) fn select_due<'a>(
    posts: impl Iterator<Item = &'a Post>,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<Post> {
    let mut due: Vec<Post> = posts.filter(|p| p.is_due(now)).cloned().collect();
    due.sort_by_key(|p| (p.scheduled_for, p.id));
    due.truncate(limit);
    due
}

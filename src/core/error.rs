//! Error types for publication, persistence, and the service surface.

use std::time::Duration;

use thiserror::Error;

use crate::core::post::PostStatus;
use crate::util::PostId;

/// Error message written to posts reclaimed from a stale `publishing` claim.
pub const ORPHANED_CLAIM_MESSAGE: &str = "orphaned publishing claim";

/// Failures produced while publishing a claimed post.
///
/// Every variant is caught by the coordinator and recorded verbatim as the
/// post's `error_message`; none of them escape an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Credentials were rejected by the platform.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Transport failure; retryable at the chunk level.
    #[error("network error: {0}")]
    Network(String),
    /// The platform refused the content or request.
    #[error("platform rejected the request: {0}")]
    Rejected(String),
    /// The endpoint answered outside the upload contract.
    #[error("upload protocol violation: {0}")]
    Protocol(String),
    /// The media reference could not be turned into a readable local resource.
    #[error("media unavailable: {0}")]
    Media(String),
    /// The payload size could not be determined before Start.
    #[error("media size unknown; refusing to start an upload session")]
    UnknownSize,
    /// The upload never finished: a chunk or the whole session ran out of time.
    #[error("transfer timed out: {0}")]
    TransferTimeout(String),
    /// The server never reported completion within the transfer-call bound.
    #[error("upload did not complete after {calls} transfer calls")]
    TransferStalled {
        /// Number of transfer calls made before giving up.
        calls: u32,
    },
    /// The whole attempt exceeded the coordinator's backstop timeout.
    #[error("publish attempt timed out after {0:?}")]
    AttemptTimeout(Duration),
    /// The adapter task panicked.
    #[error("publish adapter panicked: {0}")]
    AdapterPanicked(String),
    /// The endpoint does not support the requested operation.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl PublishError {
    /// Whether a transfer call failing with this error may be repeated for the same range.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Distinguishes "upload never finished" from "platform rejected content".
    pub const fn is_transfer_timeout(&self) -> bool {
        matches!(self, Self::TransferTimeout(_) | Self::TransferStalled { .. })
    }
}

/// Errors produced by post repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No post with this id.
    #[error("post {0} not found")]
    NotFound(PostId),
    /// A post with this id already exists.
    #[error("post {0} already exists")]
    Duplicate(PostId),
    /// The requested status change is not allowed from the current status.
    #[error("post {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        /// Post identifier.
        id: PostId,
        /// Current status.
        from: PostStatus,
        /// Requested status.
        to: PostStatus,
    },
    /// A draft was handed in with a due time; only scheduled posts carry one.
    #[error("post {0} is a draft but has a scheduled_for time")]
    DraftWithDueTime(PostId),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the publishing service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Persistence failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    /// `schedule` was called on a post without `scheduled_for`.
    #[error("post {0} has no scheduled_for time")]
    MissingScheduleTime(PostId),
    /// `schedule` was called for an existing post with a different payload.
    #[error("post {0} already exists with different content; reschedule it or delete it first")]
    ContentConflict(PostId),
}

/// Failure reported by an activity log sink. Never fails a publish attempt.
#[derive(Debug, Error)]
#[error("activity log unavailable: {0}")]
pub struct ActivityLogError(pub String);

/// Application-facing result using anyhow for bootstrap and configuration paths.
pub type AppResult<T> = Result<T, anyhow::Error>;

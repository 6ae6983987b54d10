//! Publication coordinator: claim, delegate, resolve.
//!
//! Both schedulers funnel into [`PublicationCoordinator::attempt_publish`].
//! Exclusivity comes solely from the repository's conditional claim; there
//! is no in-process lock between the schedulers. The coordinator does keep
//! the ids it has claimed and not yet resolved, so the sweep never reclaims
//! a claim that is still live in this process.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::adapter::{PublishAdapter, PublishReceipt};
use crate::core::audit::{ActivityAction, ActivityEvent, ActivityLog, Trigger};
use crate::core::error::{PublishError, RepositoryError};
use crate::core::post::{Post, Resolution};
use crate::core::repository::PostRepository;
use crate::util::{Clock, PostId};

/// Result of one `attempt_publish` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// This invocation owned the claim and the platform accepted the post.
    Published {
        /// Platform-assigned id.
        external_id: String,
    },
    /// This invocation owned the claim and the attempt failed.
    Failed {
        /// Recorded error message.
        error: String,
    },
    /// Another invocation already owned the post. Not an error.
    ClaimLost,
}

/// Held from a successful claim until the outcome is written.
struct LiveClaim<'a> {
    live: &'a Mutex<HashSet<PostId>>,
    post_id: PostId,
}

impl Drop for LiveClaim<'_> {
    fn drop(&mut self) {
        self.live.lock().remove(&self.post_id);
    }
}

/// Shared claim/publish/resolve logic.
pub struct PublicationCoordinator {
    repository: Arc<dyn PostRepository>,
    adapter: Arc<dyn PublishAdapter>,
    activity: Arc<dyn ActivityLog>,
    clock: Arc<dyn Clock>,
    attempt_timeout: Option<Duration>,
    live: Mutex<HashSet<PostId>>,
}

impl PublicationCoordinator {
    /// Create a coordinator with no attempt timeout.
    pub fn new(
        repository: Arc<dyn PostRepository>,
        adapter: Arc<dyn PublishAdapter>,
        activity: Arc<dyn ActivityLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            adapter,
            activity,
            clock,
            attempt_timeout: None,
            live: Mutex::new(HashSet::new()),
        }
    }

    /// Abort adapters that run longer than `limit` and fail the post.
    #[must_use]
    pub const fn with_attempt_timeout(mut self, limit: Option<Duration>) -> Self {
        self.attempt_timeout = limit;
        self
    }

    /// Backing repository.
    pub fn repository(&self) -> &Arc<dyn PostRepository> {
        &self.repository
    }

    /// Publish adapter.
    pub fn adapter(&self) -> &Arc<dyn PublishAdapter> {
        &self.adapter
    }

    /// Time source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Posts this coordinator has claimed and not yet resolved.
    pub fn live_claims(&self) -> Vec<PostId> {
        let mut ids: Vec<PostId> = self.live.lock().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of attempts currently between claim and resolve.
    pub fn in_flight(&self) -> usize {
        self.live.lock().len()
    }

    /// Claim `post_id`, publish it, and record the outcome.
    ///
    /// Adapter errors, panics, and timeouts all become a `failed` write; only
    /// repository failures are returned as `Err`.
    pub async fn attempt_publish(
        &self,
        post_id: PostId,
        trigger: Trigger,
    ) -> Result<AttemptOutcome, RepositoryError> {
        let span = tracing::info_span!("attempt_publish", post_id, trigger = %trigger);
        self.attempt(post_id, trigger).instrument(span).await
    }

    async fn attempt(
        &self,
        post_id: PostId,
        trigger: Trigger,
    ) -> Result<AttemptOutcome, RepositoryError> {
        let token = Uuid::new_v4();
        let claimed_at = self.clock.now();
        let Some(post) = self.repository.claim(post_id, token, claimed_at).await? else {
            tracing::info!("post {} already claimed; race prevented", post_id);
            self.record(
                ActivityEvent::new(post_id, ActivityAction::RacePrevented, claimed_at)
                    .with_trigger(trigger),
            );
            return Ok(AttemptOutcome::ClaimLost);
        };
        self.live.lock().insert(post_id);
        let _live = LiveClaim {
            live: &self.live,
            post_id,
        };

        let due = post.scheduled_for;
        tracing::debug!("post {} claimed with token {}", post_id, token);
        self.record(
            ActivityEvent::new(post_id, ActivityAction::Claimed, claimed_at)
                .with_trigger(trigger)
                .with_delay_from(due),
        );

        let result = self.run_adapter(post).await;
        let now = self.clock.now();
        let (resolution, outcome, event) = match result {
            Ok(receipt) => {
                tracing::info!("post {} published as {}", post_id, receipt.external_id);
                (
                    Resolution::Published {
                        external_id: receipt.external_id.clone(),
                        published_at: now,
                    },
                    AttemptOutcome::Published {
                        external_id: receipt.external_id.clone(),
                    },
                    ActivityEvent::new(post_id, ActivityAction::Published, now)
                        .with_detail(receipt.external_id),
                )
            }
            Err(err) => {
                let error = err.to_string();
                tracing::warn!("post {} failed: {}", post_id, error);
                (
                    Resolution::Failed {
                        error: error.clone(),
                    },
                    AttemptOutcome::Failed {
                        error: error.clone(),
                    },
                    ActivityEvent::new(post_id, ActivityAction::Failed, now).with_detail(error),
                )
            }
        };

        if !self
            .repository
            .resolve(post_id, token, resolution, now)
            .await?
        {
            tracing::warn!(
                "post {} changed while publishing; outcome not recorded",
                post_id
            );
        }

        self.record(event.with_trigger(trigger).with_delay_from(due));
        Ok(outcome)
    }

    async fn run_adapter(&self, post: Post) -> Result<PublishReceipt, PublishError> {
        let adapter = Arc::clone(&self.adapter);
        let mut task = tokio::spawn(async move { adapter.publish(&post).await });
        let joined = match self.attempt_timeout {
            Some(limit) => {
                if let Ok(joined) = tokio::time::timeout(limit, &mut task).await {
                    joined
                } else {
                    task.abort();
                    return Err(PublishError::AttemptTimeout(limit));
                }
            }
            None => task.await,
        };
        joined.unwrap_or_else(|err| Err(PublishError::AdapterPanicked(join_failure(err))))
    }

    /// Record an activity event; sink failures are logged and dropped.
    pub(crate) fn record(&self, event: ActivityEvent) {
        let post_id = event.post_id;
        let action = event.action;
        if let Err(err) = self.activity.record(event) {
            tracing::warn!("activity log dropped {} for post {}: {}", action, post_id, err);
        }
    }
}

fn join_failure(err: JoinError) -> String {
    if !err.is_panic() {
        return "adapter task was cancelled".into();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}

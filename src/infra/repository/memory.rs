//! In-memory post repository. The mutex is the atomic section.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::PostTable;
use crate::core::error::RepositoryError;
use crate::core::post::{Post, PostStatus, Resolution};
use crate::core::repository::PostRepository;
use crate::util::PostId;

/// Process-local repository for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryPostRepository {
    table: Mutex<PostTable>,
}

impl InMemoryPostRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-populated with `posts`, bypassing insert checks.
    ///
    /// Useful for seeding states only the coordinator can normally reach,
    /// such as a post stuck in `publishing` after a crash.
    pub fn with_posts(posts: impl IntoIterator<Item = Post>) -> Self {
        Self {
            table: Mutex::new(PostTable::from_rows(posts)),
        }
    }

    /// Number of stored posts.
    pub fn len(&self) -> usize {
        self.table.lock().rows().count()
    }

    /// Whether the repository holds no posts.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn insert(&self, post: Post) -> Result<Post, RepositoryError> {
        self.table.lock().insert(post)
    }

    async fn get(&self, id: PostId) -> Result<Option<Post>, RepositoryError> {
        Ok(self.table.lock().get(id))
    }

    async fn list_by_status(&self, status: PostStatus) -> Result<Vec<Post>, RepositoryError> {
        Ok(self.table.lock().list_by_status(status))
    }

    async fn schedule(
        &self,
        id: PostId,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Post, RepositoryError> {
        self.table.lock().schedule(id, at, now)
    }

    async fn cancel(&self, id: PostId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        self.table.lock().cancel(id, now)
    }

    async fn delete(&self, id: PostId) -> Result<bool, RepositoryError> {
        Ok(self.table.lock().delete(id))
    }

    async fn claim(
        &self,
        id: PostId,
        token: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>, RepositoryError> {
        Ok(self.table.lock().claim(id, token, now))
    }

    async fn resolve(
        &self,
        id: PostId,
        token: Uuid,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        Ok(self.table.lock().resolve(id, token, &resolution, now))
    }

    async fn due_posts(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Post>, RepositoryError> {
        Ok(self.table.lock().due(now, limit))
    }

    async fn reclaim_orphans(
        &self,
        claimed_before: DateTime<Utc>,
        live: &[PostId],
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Post>, RepositoryError> {
        Ok(self
            .table
            .lock()
            .reclaim_orphans(claimed_before, live, message, now))
    }
}

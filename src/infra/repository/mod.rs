//! Post repository backends.

pub mod file;
pub mod memory;

pub use file::FilePostRepository;
pub use memory::InMemoryPostRepository;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::error::RepositoryError;
use crate::core::post::{Post, PostStatus, Resolution};
use crate::core::repository::{check_insertable, select_due};
use crate::util::PostId;

/// Rows keyed by id. Backends call these inside their own atomic section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PostTable {
    rows: BTreeMap<PostId, Post>,
}

impl PostTable {
    pub(crate) fn from_rows(rows: impl IntoIterator<Item = Post>) -> Self {
        Self {
            rows: rows.into_iter().map(|post| (post.id, post)).collect(),
        }
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &Post> {
        self.rows.values()
    }

    pub(crate) fn insert(&mut self, post: Post) -> Result<Post, RepositoryError> {
        check_insertable(&post)?;
        if self.rows.contains_key(&post.id) {
            return Err(RepositoryError::Duplicate(post.id));
        }
        self.rows.insert(post.id, post.clone());
        Ok(post)
    }

    pub(crate) fn get(&self, id: PostId) -> Option<Post> {
        self.rows.get(&id).cloned()
    }

    pub(crate) fn list_by_status(&self, status: PostStatus) -> Vec<Post> {
        self.rows
            .values()
            .filter(|post| post.status == status)
            .cloned()
            .collect()
    }

    pub(crate) fn schedule(
        &mut self,
        id: PostId,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Post, RepositoryError> {
        let post = self.rows.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        if !post.apply_schedule(at, now) {
            return Err(RepositoryError::InvalidTransition {
                id,
                from: post.status,
                to: PostStatus::Scheduled,
            });
        }
        Ok(post.clone())
    }

    pub(crate) fn cancel(
        &mut self,
        id: PostId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let post = self.rows.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        Ok(post.apply_cancel(now))
    }

    pub(crate) fn delete(&mut self, id: PostId) -> bool {
        match self.rows.get(&id) {
            Some(post) if post.status != PostStatus::Publishing => {
                self.rows.remove(&id);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn claim(&mut self, id: PostId, token: Uuid, now: DateTime<Utc>) -> Option<Post> {
        let post = self.rows.get_mut(&id)?;
        post.apply_claim(token, now).then(|| post.clone())
    }

    pub(crate) fn resolve(
        &mut self,
        id: PostId,
        token: Uuid,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> bool {
        self.rows
            .get_mut(&id)
            .is_some_and(|post| post.apply_resolution(token, resolution, now))
    }

    pub(crate) fn due(&self, now: DateTime<Utc>, limit: usize) -> Vec<Post> {
        select_due(self.rows.values(), now, limit)
    }

    pub(crate) fn reclaim_orphans(
        &mut self,
        claimed_before: DateTime<Utc>,
        live: &[PostId],
        message: &str,
        now: DateTime<Utc>,
    ) -> Vec<Post> {
        self.rows
            .values_mut()
            .filter(|post| !live.contains(&post.id))
            .filter_map(|post| {
                post.apply_orphan_reclaim(claimed_before, message, now)
                    .then(|| post.clone())
            })
            .collect()
    }
}

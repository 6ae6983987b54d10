//! File-backed post repository.
//!
//! Posts are kept as one JSON object per line. Every mutation rewrites the
//! snapshot to a temporary file and renames it over the original, so a
//! crash leaves either the old or the new state on disk. The snapshot is
//! reloaded on open; timers are not persisted, the sweep recovers them.
//!
//! The table lives in memory, so only one handle may own a directory at a
//! time. `open` takes an exclusive `fs2` lock on `posts.lock` and fails if
//! another process (or another handle in this one) holds it. The OS drops
//! the lock when the owner exits, crashed or not. Several processes that
//! need to share one store need a database-backed repository instead.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::Mutex;
use uuid::Uuid;

use super::PostTable;
use crate::core::error::RepositoryError;
use crate::core::post::{Post, PostStatus, Resolution};
use crate::core::repository::PostRepository;
use crate::util::PostId;

const SNAPSHOT_FILE: &str = "posts.jsonl";
const LOCK_FILE: &str = "posts.lock";

fn backend(err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Backend(err.to_string())
}

/// Durable repository stored under a directory.
pub struct FilePostRepository {
    dir: PathBuf,
    table: Mutex<PostTable>,
    // held for the repository's lifetime; closing it releases the lock
    _lock: File,
}

impl FilePostRepository {
    /// Open (or create) a repository in `dir`, loading any existing snapshot.
    ///
    /// Fails with [`RepositoryError::Backend`] while another handle owns `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(backend)?;
        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| backend(format!("opening {}: {e}", lock_path.display())))?;
        lock.try_lock_exclusive().map_err(|_| {
            backend(format!(
                "{} is in use by another repository handle ({} is locked)",
                dir.display(),
                lock_path.display()
            ))
        })?;

        let repo = Self {
            dir,
            table: Mutex::new(PostTable::default()),
            _lock: lock,
        };
        let loaded = repo.load_from_disk()?;
        tracing::debug!(
            "loaded {} posts from {}",
            loaded.rows().count(),
            repo.snapshot_path().display()
        );
        *repo.table.lock() = loaded;
        Ok(repo)
    }

    /// Path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    fn load_from_disk(&self) -> Result<PostTable, RepositoryError> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(PostTable::default());
        }
        let file = OpenOptions::new().read(true).open(&path).map_err(backend)?;
        let mut posts = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(backend)?;
            if line.trim().is_empty() {
                continue;
            }
            let post: Post = serde_json::from_str(&line)
                .map_err(|e| backend(format!("{}:{}: {e}", path.display(), index + 1)))?;
            posts.push(post);
        }
        Ok(PostTable::from_rows(posts))
    }

    fn write_to_disk(&self, table: &PostTable) -> Result<(), RepositoryError> {
        let path = self.snapshot_path();
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp).map_err(backend)?);
            for post in table.rows() {
                let line = serde_json::to_string(post).map_err(backend)?;
                writeln!(out, "{line}").map_err(backend)?;
            }
            let file = out.into_inner().map_err(backend)?;
            file.sync_all().map_err(backend)?;
        }
        fs::rename(&tmp, &path).map_err(backend)
    }

    /// Run `op` inside the atomic section; persist if rows changed, roll back if persisting fails.
    fn mutate<R>(
        &self,
        op: impl FnOnce(&mut PostTable) -> Result<R, RepositoryError>,
    ) -> Result<R, RepositoryError> {
        let mut table = self.table.lock();
        let before = table.clone();
        let out = op(&mut table)?;
        if *table != before {
            if let Err(err) = self.write_to_disk(&table) {
                *table = before;
                return Err(err);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl PostRepository for FilePostRepository {
    async fn insert(&self, post: Post) -> Result<Post, RepositoryError> {
        self.mutate(|table| table.insert(post))
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
        self.mutate(|table| table.schedule(id, at, now))
    }

    async fn cancel(&self, id: PostId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        self.mutate(|table| table.cancel(id, now))
    }

    async fn delete(&self, id: PostId) -> Result<bool, RepositoryError> {
        self.mutate(|table| Ok(table.delete(id)))
    }

    async fn claim(
        &self,
        id: PostId,
        token: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>, RepositoryError> {
        self.mutate(|table| Ok(table.claim(id, token, now)))
    }

    async fn resolve(
        &self,
        id: PostId,
        token: Uuid,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.mutate(|table| Ok(table.resolve(id, token, &resolution, now)))
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
        self.mutate(|table| Ok(table.reclaim_orphans(claimed_before, live, message, now)))
    }
}

//! Local file media.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::core::adapter::{ChunkSource, MediaResolver};
use crate::core::error::PublishError;
use crate::core::upload::OffsetRange;

/// A local file opened for ranged reads.
pub struct LocalMedia {
    path: PathBuf,
    file: File,
    size: u64,
}

impl LocalMedia {
    /// Open `path` and record its size.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PublishError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| PublishError::Media(format!("{}: {e}", path.display())))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| PublishError::Media(format!("{}: {e}", path.display())))?
            .len();
        Ok(Self { path, file, size })
    }

    /// Path of the opened file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChunkSource for LocalMedia {
    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    async fn read_range(&mut self, range: OffsetRange) -> Result<Vec<u8>, PublishError> {
        if range.end > self.size {
            return Err(PublishError::Media(format!(
                "{}: range {range} beyond {} bytes",
                self.path.display(),
                self.size
            )));
        }
        let len =
            usize::try_from(range.byte_len()).map_err(|e| PublishError::Media(e.to_string()))?;
        let mut buf = vec![0_u8; len];
        self.file
            .seek(SeekFrom::Start(range.start))
            .await
            .map_err(|e| PublishError::Media(e.to_string()))?;
        self.file
            .read_exact(&mut buf)
            .await
            .map_err(|e| PublishError::Media(e.to_string()))?;
        Ok(buf)
    }
}

/// Resolves media references as relative paths under a root directory.
#[derive(Debug, Clone)]
pub struct LocalFileResolver {
    root: PathBuf,
}

impl LocalFileResolver {
    /// Resolver rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn locate(&self, media_ref: &str) -> Result<PathBuf, PublishError> {
        let relative = Path::new(media_ref);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if media_ref.is_empty() || escapes {
            return Err(PublishError::Media(format!(
                "media reference `{media_ref}` must be a relative path inside the media root"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MediaResolver for LocalFileResolver {
    async fn resolve(&self, media_ref: &str) -> Result<Box<dyn ChunkSource>, PublishError> {
        let path = self.locate(media_ref)?;
        Ok(Box::new(LocalMedia::open(path).await?))
    }
}

//! Publish adapters and the media ports they consume.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::UploadConfig;
use crate::core::error::PublishError;
use crate::core::post::Post;
use crate::core::upload::{ChunkedUploadClient, OffsetRange, PublishEndpoint, PublishMetadata};

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Platform-assigned id.
    pub external_id: String,
    /// Platform name.
    pub platform: String,
}

/// Capability interface implemented per target platform.
#[async_trait]
pub trait PublishAdapter: Send + Sync {
    /// Platform name.
    fn platform(&self) -> &str;

    /// Deliver `post`. Must not mutate post state; the coordinator owns that.
    async fn publish(&self, post: &Post) -> Result<PublishReceipt, PublishError>;

    /// Check credentials without publishing anything.
    async fn verify_connection(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Readable, sized byte source for one media payload.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Total size in bytes, if known.
    fn size(&self) -> Option<u64>;

    /// Read exactly the bytes in `range`.
    async fn read_range(&mut self, range: OffsetRange) -> Result<Vec<u8>, PublishError>;
}

/// Turns a post's `media_ref` into a local readable resource.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolve `media_ref`.
    async fn resolve(&self, media_ref: &str) -> Result<Box<dyn ChunkSource>, PublishError>;
}

/// In-memory payload.
#[derive(Debug, Clone)]
pub struct MemorySource {
    bytes: Vec<u8>,
    size_known: bool,
}

impl MemorySource {
    /// Payload with a known size.
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            size_known: true,
        }
    }

    /// Payload whose size is not reported (a stream of unknown length).
    pub const fn without_size(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            size_known: false,
        }
    }
}

#[async_trait]
impl ChunkSource for MemorySource {
    fn size(&self) -> Option<u64> {
        self.size_known.then(|| self.bytes.len() as u64)
    }

    async fn read_range(&mut self, range: OffsetRange) -> Result<Vec<u8>, PublishError> {
        let start = usize::try_from(range.start).map_err(|e| PublishError::Media(e.to_string()))?;
        let end = usize::try_from(range.end).map_err(|e| PublishError::Media(e.to_string()))?;
        self.bytes
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| PublishError::Media(format!("range {range} outside in-memory payload")))
    }
}

/// Adapter for platforms that take media through a [`PublishEndpoint`].
///
/// Posts with a `media_ref` go through the chunked upload client; posts
/// without one are published as text.
pub struct ChunkedPublishAdapter {
    client: ChunkedUploadClient,
    resolver: Arc<dyn MediaResolver>,
}

impl ChunkedPublishAdapter {
    /// Create an adapter over `endpoint`.
    pub fn new(
        endpoint: Arc<dyn PublishEndpoint>,
        resolver: Arc<dyn MediaResolver>,
        upload: UploadConfig,
    ) -> Self {
        Self {
            client: ChunkedUploadClient::new(endpoint, upload),
            resolver,
        }
    }
}

#[async_trait]
impl PublishAdapter for ChunkedPublishAdapter {
    fn platform(&self) -> &str {
        self.client.endpoint().platform()
    }

    async fn publish(&self, post: &Post) -> Result<PublishReceipt, PublishError> {
        let metadata = PublishMetadata {
            title: post.title.clone(),
            description: post.content.clone(),
        };
        let external_id = match post.media_ref.as_deref() {
            None => self.client.endpoint().publish_text(&metadata).await?,
            Some(media_ref) => {
                let mut source = self.resolver.resolve(media_ref).await?;
                self.client.upload(source.as_mut(), &metadata).await?
            }
        };
        Ok(PublishReceipt {
            external_id,
            platform: self.platform().to_string(),
        })
    }

    async fn verify_connection(&self) -> Result<(), PublishError> {
        self.client.endpoint().verify().await
    }
}

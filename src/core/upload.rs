//! Resumable three-phase upload: Start, Transfer (loop), Finish.
//!
//! The server owns progress. Every transfer response carries the next byte
//! range to send; the client uses it verbatim and only treats the upload as
//! complete when the server returns an empty range (`start == end`).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::UploadConfig;
use crate::core::adapter::ChunkSource;
use crate::core::error::PublishError;

/// Half-open byte range `[start, end)` handed out by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OffsetRange {
    /// First byte to send.
    pub start: u64,
    /// One past the last byte to send.
    pub end: u64,
}

impl OffsetRange {
    /// Range `[start, end)`.
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes in the range.
    pub const fn byte_len(self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// The server signals completion with an empty range.
    pub const fn is_complete(self) -> bool {
        self.start == self.end
    }

    /// Reject ranges that run backwards or past the payload.
    pub fn check_within(self, total_size: u64) -> Result<Self, PublishError> {
        if self.start > self.end || self.end > total_size {
            return Err(PublishError::Protocol(format!(
                "server returned range {self} outside payload of {total_size} bytes"
            )));
        }
        Ok(self)
    }
}

impl fmt::Display for OffsetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Parameters sent with the Start phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRequest {
    /// Total payload size in bytes.
    pub file_size: u64,
    /// Preferred chunk size for endpoints that take a hint; servers that
    /// choose their own ranges ignore it.
    pub chunk_size: u64,
}

/// Server-side session identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Opaque session token.
    pub session_id: String,
    /// Platform object the session uploads into; becomes the external id.
    pub object_id: String,
}

/// Which contract the Start response matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartResponse {
    /// Resumable session with a first range to send.
    Chunked {
        /// Session identity.
        session: SessionHandle,
        /// First range to send.
        range: OffsetRange,
    },
    /// Single-shot variant: the whole payload goes to `upload_url`.
    Direct {
        /// Platform object id.
        object_id: String,
        /// Where to send the bytes.
        upload_url: String,
    },
}

/// Metadata submitted at Finish (and for text-only posts).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishMetadata {
    /// Optional title.
    pub title: Option<String>,
    /// Description / message body.
    pub description: String,
}

/// One platform's upload endpoint.
#[async_trait]
pub trait PublishEndpoint: Send + Sync {
    /// Platform name used in logs and receipts.
    fn platform(&self) -> &str;

    /// Open an upload session.
    async fn start_session(&self, request: StartRequest) -> Result<StartResponse, PublishError>;

    /// Send `bytes` for `range`; returns the next range the server wants.
    async fn transfer_chunk(
        &self,
        session: &SessionHandle,
        range: OffsetRange,
        bytes: &[u8],
    ) -> Result<OffsetRange, PublishError>;

    /// Close the session and publish; returns the platform-assigned id.
    async fn finish_session(
        &self,
        session: &SessionHandle,
        metadata: &PublishMetadata,
    ) -> Result<String, PublishError>;

    /// Single-shot upload for endpoints that answered Start with a direct URL.
    async fn upload_direct(
        &self,
        object_id: &str,
        upload_url: &str,
        bytes: &[u8],
    ) -> Result<String, PublishError> {
        let _ = (object_id, upload_url, bytes);
        Err(PublishError::Unsupported(format!(
            "{} does not support direct uploads",
            self.platform()
        )))
    }

    /// Publish a post that carries no media.
    async fn publish_text(&self, metadata: &PublishMetadata) -> Result<String, PublishError> {
        let _ = metadata;
        Err(PublishError::Unsupported(format!(
            "{} does not support text-only posts",
            self.platform()
        )))
    }

    /// Check that credentials are accepted.
    async fn verify(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Upload phase, as tracked on [`UploadSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    /// Session not yet opened.
    Start,
    /// Sending ranges.
    Transfer,
    /// Server reported completion; ready to finalize.
    Finish,
}

/// Protocol-scoped state of one chunked transfer. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Server session identity.
    pub handle: SessionHandle,
    /// Payload size in bytes.
    pub total_size: u64,
    /// Next range to send, as returned by the server.
    pub cursor: OffsetRange,
    /// Current phase.
    pub phase: UploadPhase,
}

impl UploadSession {
    /// Session positioned at the server's first range.
    pub fn open(
        handle: SessionHandle,
        total_size: u64,
        first: OffsetRange,
    ) -> Result<Self, PublishError> {
        let mut session = Self {
            handle,
            total_size,
            cursor: OffsetRange::new(0, 0),
            phase: UploadPhase::Transfer,
        };
        session.advance(first)?;
        Ok(session)
    }

    /// Move the cursor to the server-returned range.
    pub fn advance(&mut self, next: OffsetRange) -> Result<(), PublishError> {
        self.cursor = next.check_within(self.total_size)?;
        if next.is_complete() {
            self.phase = UploadPhase::Finish;
        }
        Ok(())
    }
}

/// Exponential backoff: `base * 2^(attempt - 1)`, attempt being 1-indexed.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent)
}

enum UploadStep {
    Start,
    Transfer(UploadSession),
    Finish(UploadSession),
    Done(String),
}

/// Drives a [`PublishEndpoint`] through a complete upload.
pub struct ChunkedUploadClient {
    endpoint: Arc<dyn PublishEndpoint>,
    config: UploadConfig,
}

impl ChunkedUploadClient {
    /// Create a client over `endpoint`.
    pub fn new(endpoint: Arc<dyn PublishEndpoint>, config: UploadConfig) -> Self {
        Self { endpoint, config }
    }

    /// The endpoint this client talks to.
    pub fn endpoint(&self) -> &Arc<dyn PublishEndpoint> {
        &self.endpoint
    }

    /// Upload `source` and publish it with `metadata`; returns the external id.
    ///
    /// Fails fast when the source size is unknown. Finish is only called once
    /// the server has reported completion.
    pub async fn upload(
        &self,
        source: &mut dyn ChunkSource,
        metadata: &PublishMetadata,
    ) -> Result<String, PublishError> {
        let total_size = source.size().ok_or(PublishError::UnknownSize)?;
        let limit = self.config.session_timeout();
        match tokio::time::timeout(limit, self.run(source, total_size, metadata)).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::TransferTimeout(format!(
                "upload session exceeded {limit:?}"
            ))),
        }
    }

    async fn run(
        &self,
        source: &mut dyn ChunkSource,
        total_size: u64,
        metadata: &PublishMetadata,
    ) -> Result<String, PublishError> {
        let max_calls = self.config.transfer_call_bound(total_size);
        let mut calls = 0_u32;
        let mut step = UploadStep::Start;

        loop {
            step = match step {
                UploadStep::Start => self.start(source, total_size).await?,
                UploadStep::Transfer(mut session) => {
                    let range = session.cursor;
                    let bytes = source.read_range(range).await?;
                    let next = self
                        .transfer_with_retry(&session, range, &bytes, &mut calls, max_calls)
                        .await?;
                    session.advance(next)?;
                    tracing::debug!(
                        "upload {} chunk {} sent; next: {}",
                        session.handle.session_id,
                        range,
                        next
                    );
                    if session.phase == UploadPhase::Finish {
                        UploadStep::Finish(session)
                    } else {
                        UploadStep::Transfer(session)
                    }
                }
                UploadStep::Finish(session) => {
                    let external_id = self
                        .endpoint
                        .finish_session(&session.handle, metadata)
                        .await?;
                    tracing::info!(
                        "upload {} finished after {} transfer calls; external id {}",
                        session.handle.session_id,
                        calls,
                        external_id
                    );
                    UploadStep::Done(external_id)
                }
                UploadStep::Done(external_id) => return Ok(external_id),
            };
        }
    }

    async fn start(
        &self,
        source: &mut dyn ChunkSource,
        total_size: u64,
    ) -> Result<UploadStep, PublishError> {
        let request = StartRequest {
            file_size: total_size,
            chunk_size: self.config.chunk_size_bytes,
        };
        match self.endpoint.start_session(request).await? {
            StartResponse::Chunked { session, range } => {
                tracing::debug!(
                    "upload {} started for {} bytes; first: {}",
                    session.session_id,
                    total_size,
                    range
                );
                let session = UploadSession::open(session, total_size, range)?;
                Ok(if session.phase == UploadPhase::Finish {
                    UploadStep::Finish(session)
                } else {
                    UploadStep::Transfer(session)
                })
            }
            StartResponse::Direct {
                object_id,
                upload_url,
            } => {
                let bytes = source.read_range(OffsetRange::new(0, total_size)).await?;
                let external_id = self
                    .endpoint
                    .upload_direct(&object_id, &upload_url, &bytes)
                    .await?;
                tracing::info!(
                    "direct upload of {} bytes finished; external id {}",
                    total_size,
                    external_id
                );
                Ok(UploadStep::Done(external_id))
            }
        }
    }

    async fn transfer_with_retry(
        &self,
        session: &UploadSession,
        range: OffsetRange,
        bytes: &[u8],
        calls: &mut u32,
        max_calls: u32,
    ) -> Result<OffsetRange, PublishError> {
        let chunk_timeout = self.config.chunk_timeout();
        let mut attempt = 0_u32;
        loop {
            if *calls >= max_calls {
                return Err(PublishError::TransferStalled { calls: *calls });
            }
            *calls += 1;
            attempt += 1;

            let call = self.endpoint.transfer_chunk(&session.handle, range, bytes);
            let result = tokio::time::timeout(chunk_timeout, call)
                .await
                .unwrap_or_else(|_| {
                    Err(PublishError::TransferTimeout(format!(
                        "chunk {range} timed out after {chunk_timeout:?}"
                    )))
                });

            match result {
                Ok(next) => return Ok(next),
                Err(err)
                    if (err.is_retryable() || err.is_transfer_timeout())
                        && attempt <= self.config.max_chunk_retries =>
                {
                    let delay = backoff_delay(self.config.retry_base_delay(), attempt);
                    tracing::warn!(
                        "upload {} chunk {} failed (attempt {}): {}; retrying in {:?}",
                        session.handle.session_id,
                        range,
                        attempt,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

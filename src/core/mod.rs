//! Post lifecycle, claim coordination, schedulers, and the upload protocol.

pub mod adapter;
pub mod audit;
pub mod coordinator;
pub mod error;
pub mod post;
pub mod precise;
pub mod repository;
pub mod sweep;
pub mod upload;

pub use adapter::{
    ChunkSource, ChunkedPublishAdapter, MediaResolver, MemorySource, PublishAdapter,
    PublishReceipt,
};
pub use audit::{
    ActivityAction, ActivityEvent, ActivityLog, InMemoryActivityLog, TracingActivityLog, Trigger,
};
pub use coordinator::{AttemptOutcome, PublicationCoordinator};
pub use error::{
    ActivityLogError, AppResult, PublishError, RepositoryError, ServiceError,
    ORPHANED_CLAIM_MESSAGE,
};
pub use post::{Post, PostStatus, Resolution};
pub use precise::PreciseScheduler;
pub use repository::PostRepository;
pub use sweep::{SweepReport, SweepScheduler, SweepStats};
pub use upload::{
    backoff_delay, ChunkedUploadClient, OffsetRange, PublishEndpoint, PublishMetadata,
    SessionHandle, StartRequest, StartResponse, UploadPhase, UploadSession,
};

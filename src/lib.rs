//! # Scheduled Publisher
//!
//! At-most-once scheduled publication of posts to an external platform.
//!
//! A post scheduled for a future time must reach the platform exactly once,
//! surviving restarts, sleep/wake cycles, two independent scheduling loops,
//! and partial failures of large media transfers.
//!
//! ## How it fits together
//!
//! - **Scheduler A** ([`core::PreciseScheduler`]) arms a one-shot timer per
//!   post so it fires right at its due time.
//! - **Scheduler B** ([`core::SweepScheduler`]) polls the store on a short
//!   interval for overdue posts that lost their timer, and reclaims posts
//!   stuck in `publishing` after a crash.
//! - Both call [`core::PublicationCoordinator::attempt_publish`], which
//!   claims the post with a single conditional update
//!   (`scheduled` → `publishing`), runs the [`core::PublishAdapter`], and
//!   records the outcome. Losing the claim is an expected no-op.
//! - Media goes through [`core::ChunkedUploadClient`]: a resumable
//!   start/transfer/finish session in which the server's offsets are
//!   authoritative.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scheduled_publisher::builders::PublisherBuilder;
//! use scheduled_publisher::config::PublisherConfig;
//! use scheduled_publisher::core::Post;
//! use scheduled_publisher::infra::FilePostRepository;
//!
//! let config = PublisherConfig::from_env()?;
//! let service = PublisherBuilder::new(config)
//!     .repository(Arc::new(FilePostRepository::open("./data")?))
//!     .media_root("./media")
//!     .build()?;
//! service.start().await?;
//!
//! let post = Post::new(1, "Launch day", service.now())
//!     .with_media("launch.mp4")
//!     .due_at(service.now() + chrono::Duration::hours(2));
//! service.schedule(post).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Post lifecycle, coordinator, schedulers, and upload protocol.
pub mod core;
/// Configuration models for scheduling, uploads, and credentials.
pub mod config;
/// Builders to assemble the service from configuration.
pub mod builders;
/// Storage backends, the Graph endpoint, and local media.
pub mod infra;
/// Service surface and API models.
pub mod runtime;
/// Shared utilities.
pub mod util;

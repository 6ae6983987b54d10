//! Service surface and API models.

pub mod api;
pub mod service;

pub use api::{health, schedule_post, Health, PostStatusResponse, ScheduleRequest, SchedulerStatus};
pub use service::PublishingService;

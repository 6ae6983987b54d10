//! Configuration models for scheduling, uploads, and platform credentials.

pub mod publisher;

pub use publisher::*;

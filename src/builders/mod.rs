//! Builders to construct the publishing service from configuration.

pub mod publisher_builder;

pub use publisher_builder::PublisherBuilder;

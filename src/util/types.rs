//! Identifier aliases shared across the crate.

/// Stable, immutable identifier of a post.
pub type PostId = u64;

//! Concrete collaborators: storage backends, the Graph endpoint, and local media.

pub mod graph;
pub mod media;
pub mod repository;

pub use graph::GraphVideoEndpoint;
pub use media::{LocalFileResolver, LocalMedia};
pub use repository::{FilePostRepository, InMemoryPostRepository};

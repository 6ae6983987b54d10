//! Shared utilities: time source, identifiers, and tracing setup.

pub mod clock;
pub mod telemetry;
pub mod types;

pub use clock::*;
pub use telemetry::*;
pub use types::*;

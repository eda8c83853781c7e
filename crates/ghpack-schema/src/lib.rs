//! Shared types for ghpack.
//!
//! Repository records as returned by the hosting API, and the validated
//! [`ArchiveTarget`] that names one repository archive to retrieve.

pub mod target;
pub mod types;

// Re-exports
pub use target::{ArchiveTarget, RESERVED_PREFIX, TargetError, validate_component};
pub use types::*;

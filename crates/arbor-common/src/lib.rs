//! Arbor Common - Shared types and traits
//!
//! This crate provides the foundational types used across Arbor components:
//! - The topology error taxonomy
//! - The cancellation context passed to blocking lock calls
//! - Collaborator traits for dependency injection

pub mod context;
pub mod error;
pub mod traits;

// Re-exports for convenience
pub use context::{LockContext, WaitCause};
pub use error::{ErrorKind, Result, TopoError};
pub use traits::{LockHandle, SessionEstablisher};

/// Cell created by every store, mirroring the global topology partition
pub const GLOBAL_CELL: &str = "global";

/// Separator between path components
pub const PATH_SEPARATOR: char = '/';

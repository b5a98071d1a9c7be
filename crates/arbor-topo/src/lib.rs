//! Arbor Topo - In-memory topology store with advisory locks
//!
//! This crate provides:
//! - A hierarchical node store partitioned into cells
//! - Cell-scoped connections with pluggable session establishment
//! - Path-scoped exclusive locks with broadcast wake-up on release
//! - Node watches for lock grants and contents changes
//! - Configuration, logging and metrics setup

pub mod config;
pub mod conn;
pub mod lock;
pub mod logging;
pub mod metrics;
mod node;
pub mod store;
pub mod watch;

pub use config::TopoConfig;
pub use conn::Conn;
pub use lock::{LockDescriptor, convert_error};
pub use logging::{LoggingConfig, init_logging};
pub use store::NodeStore;
pub use watch::{Watch, WatchOptions};

// Re-export the shared vocabulary so callers need a single dependency
pub use arbor_common::{
    ErrorKind, GLOBAL_CELL, LockContext, LockHandle, Result, SessionEstablisher, TopoError,
    WaitCause,
};

//! Error types for topology and lock operations
//!
//! This module defines:
//! - `TopoError`: every failure a store, connection, or lock call can return
//! - `ErrorKind`: a fieldless discriminant for caller-side branching

use std::fmt::{Display, Formatter};

/// Errors returned by the node store and the lock protocol
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TopoError {
    #[error("node doesn't exist: {0}")]
    NoNode(String),

    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("node {0} is not locked")]
    NotLocked(String),

    #[error("store fault: {0}")]
    StoreFault(String),

    #[error("cell '{0}' not exist")]
    NoCell(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Error discriminant without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoNode,
    NodeExists,
    Interrupted,
    Timeout,
    NotLocked,
    StoreFault,
    NoCell,
    ConnectionClosed,
    InvalidPath,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoNode => "no_node",
            ErrorKind::NodeExists => "node_exists",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotLocked => "not_locked",
            ErrorKind::StoreFault => "store_fault",
            ErrorKind::NoCell => "no_cell",
            ErrorKind::ConnectionClosed => "connection_closed",
            ErrorKind::InvalidPath => "invalid_path",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TopoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TopoError::NoNode(_) => ErrorKind::NoNode,
            TopoError::NodeExists(_) => ErrorKind::NodeExists,
            TopoError::Interrupted(_) => ErrorKind::Interrupted,
            TopoError::Timeout(_) => ErrorKind::Timeout,
            TopoError::NotLocked(_) => ErrorKind::NotLocked,
            TopoError::StoreFault(_) => ErrorKind::StoreFault,
            TopoError::NoCell(_) => ErrorKind::NoCell,
            TopoError::ConnectionClosed => ErrorKind::ConnectionClosed,
            TopoError::InvalidPath(_) => ErrorKind::InvalidPath,
        }
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// Whether the caller gave up waiting (cancellation or deadline)
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TopoError::Interrupted(_) | TopoError::Timeout(_))
    }
}

/// Result type for topology operations
pub type Result<T> = std::result::Result<T, TopoError>;

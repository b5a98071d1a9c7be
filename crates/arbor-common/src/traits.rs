//! Collaborator traits
//!
//! The lock protocol depends on these seams rather than on concrete
//! connection types, so harnesses can substitute their own behaviour.

use async_trait::async_trait;

use crate::context::LockContext;
use crate::error::Result;

/// Produces or validates a live session before a lock attempt
///
/// Called once per attempt, including every retry after a wake-up. A failure
/// is returned to the lock caller unchanged.
#[async_trait]
pub trait SessionEstablisher: Send + Sync {
    async fn ensure_session(&self, ctx: &LockContext) -> Result<()>;
}

/// Capability returned by a successful lock acquisition
///
/// The holder of a handle is the only party that can release the lock it
/// stands for. Handles are single use: once released, further unlocks fail.
#[async_trait]
pub trait LockHandle: Send + Sync {
    /// Report whether the lock may have been lost behind the holder's back
    ///
    /// Only meaningful for backends that can expire a lock on their own. An
    /// `Ok` does not mean the handle is unreleased.
    async fn check(&self, ctx: &LockContext) -> Result<()>;

    /// Release the lock, waking every blocked waiter
    async fn unlock(&self, ctx: &LockContext) -> Result<()>;
}

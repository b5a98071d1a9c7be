//! Path-scoped advisory locks
//!
//! Acquisition is a retry loop: inside the store mutex a caller either takes
//! an unlocked node or subscribes to the holder's release signal. Waiting
//! happens outside the mutex and races the caller's context. A release wakes
//! every subscriber at once; they all go back through the loop and exactly
//! one of them wins the next grant. No waiting order is kept.

use arbor_common::{LockContext, LockHandle, Result, TopoError, WaitCause};
use async_trait::async_trait;
use tracing::{debug, trace};

use crate::conn::Conn;
use crate::metrics;
use crate::node::{LockSignal, LockWaiter, resolve};

/// Map a context cancellation into a topology error for `path`
pub fn convert_error(cause: WaitCause, path: &str) -> TopoError {
    match cause {
        WaitCause::Cancelled => TopoError::Interrupted(path.to_string()),
        WaitCause::DeadlineExceeded => TopoError::Timeout(path.to_string()),
    }
}

enum Attempt {
    Granted(u64),
    Held(LockWaiter),
}

/// Handle for one granted lock
#[derive(Clone)]
pub struct LockDescriptor {
    conn: Conn,
    path: String,
    contents: String,
    generation: u64,
}

impl std::fmt::Debug for LockDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockDescriptor")
            .field("cell", &self.conn.cell())
            .field("path", &self.path)
            .field("contents", &self.contents)
            .field("generation", &self.generation)
            .finish()
    }
}

impl LockDescriptor {
    pub fn cell(&self) -> &str {
        self.conn.cell()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    fn release(&self) -> Result<()> {
        let cell = self.conn.cell();
        let mut state = self.conn.store().state();
        state.check_fault()?;

        let node = resolve(&mut state.cells, cell, &self.path)?
            .ok_or_else(|| TopoError::NoNode(self.path.clone()))?;
        if node.lock.as_ref().map(LockSignal::generation) != Some(self.generation) {
            return Err(TopoError::NotLocked(self.path.clone()));
        }
        if let Some(signal) = node.lock.take() {
            signal.fire();
        }
        node.lock_contents.clear();

        metrics::record_released(cell);
        debug!(cell = %cell, path = %self.path, generation = self.generation, "Lock released");
        Ok(())
    }
}

#[async_trait]
impl LockHandle for LockDescriptor {
    /// Locks in this store are only lost through an explicit unlock
    async fn check(&self, _ctx: &LockContext) -> Result<()> {
        Ok(())
    }

    async fn unlock(&self, _ctx: &LockContext) -> Result<()> {
        self.release().inspect_err(|e| metrics::record_error(e.kind()))
    }
}

impl Conn {
    /// Lock the node at `path`, waiting while another holder has it
    ///
    /// `contents` describes the holder and is delivered to every lock
    /// watcher of the node when the grant happens.
    pub async fn lock(
        &self,
        ctx: &LockContext,
        path: &str,
        contents: &str,
    ) -> Result<LockDescriptor> {
        let ctx = self.store().bounded_context(ctx);
        self.acquire(&ctx, path, contents)
            .await
            .inspect_err(|e| metrics::record_error(e.kind()))
    }

    /// Single attempt; fails with `NodeExists` if the node is already locked
    pub async fn try_lock(
        &self,
        ctx: &LockContext,
        path: &str,
        contents: &str,
    ) -> Result<LockDescriptor> {
        self.acquire_once(ctx, path, contents)
            .await
            .inspect_err(|e| metrics::record_error(e.kind()))
    }

    async fn acquire_once(
        &self,
        ctx: &LockContext,
        path: &str,
        contents: &str,
    ) -> Result<LockDescriptor> {
        self.session().ensure_session(ctx).await?;
        match self.attempt(path, contents)? {
            Attempt::Granted(generation) => Ok(self.descriptor(path, contents, generation)),
            Attempt::Held(_) => Err(TopoError::NodeExists(path.to_string())),
        }
    }

    async fn acquire(
        &self,
        ctx: &LockContext,
        path: &str,
        contents: &str,
    ) -> Result<LockDescriptor> {
        let mut waited: Option<metrics::Timer> = None;
        loop {
            self.session().ensure_session(ctx).await?;

            let waiter = match self.attempt(path, contents)? {
                Attempt::Granted(generation) => {
                    if let Some(timer) = &waited {
                        metrics::record_wait_duration(self.cell(), timer);
                    }
                    return Ok(self.descriptor(path, contents, generation));
                }
                Attempt::Held(waiter) => waiter,
            };

            waited.get_or_insert_with(metrics::Timer::new);
            metrics::record_wait(self.cell());
            trace!(cell = %self.cell(), path = %path, "Lock held elsewhere, waiting");

            tokio::select! {
                _ = waiter.released() => {
                    trace!(cell = %self.cell(), path = %path, "Lock released, retrying");
                }
                cause = ctx.done() => {
                    debug!(cell = %self.cell(), path = %path, ?cause, "Gave up waiting for lock");
                    return Err(convert_error(cause, path));
                }
            }
        }
    }

    /// One pass through the store mutex: grant or subscribe
    fn attempt(&self, path: &str, contents: &str) -> Result<Attempt> {
        let mut state = self.store().state();
        state.check_fault()?;

        let generation = state.next_generation + 1;
        let node = resolve(&mut state.cells, self.cell(), path)?
            .ok_or_else(|| TopoError::NoNode(path.to_string()))?;

        if let Some(signal) = &node.lock {
            return Ok(Attempt::Held(signal.subscribe()));
        }

        node.lock = Some(LockSignal::new(generation));
        node.lock_contents = contents.to_string();
        node.notify_lock(contents);
        state.next_generation = generation;

        metrics::record_acquired(self.cell());
        debug!(
            cell = %self.cell(),
            path = %path,
            session_id = %self.session_id(),
            generation,
            "Lock acquired"
        );
        Ok(Attempt::Granted(generation))
    }

    fn descriptor(&self, path: &str, contents: &str, generation: u64) -> LockDescriptor {
        LockDescriptor {
            conn: self.clone(),
            path: path.to_string(),
            contents: contents.to_string(),
            generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::NodeStore;
    use crate::watch::WatchOptions;

    fn setup() -> (NodeStore, Conn) {
        let store = NodeStore::default();
        store.create("global", "/keyspace1/shard0", "").unwrap();
        let conn = store.connect("global").unwrap();
        (store, conn)
    }

    #[test]
    fn test_convert_error() {
        assert_eq!(
            convert_error(WaitCause::Cancelled, "/a"),
            TopoError::Interrupted("/a".to_string())
        );
        assert_eq!(
            convert_error(WaitCause::DeadlineExceeded, "/a"),
            TopoError::Timeout("/a".to_string())
        );
    }

    #[tokio::test]
    async fn test_lock_unlock() {
        let (store, conn) = setup();
        let ctx = LockContext::new();

        let ld = conn.lock(&ctx, "/keyspace1/shard0", "holder").await.unwrap();
        assert_eq!(ld.path(), "/keyspace1/shard0");
        assert_eq!(ld.cell(), "global");
        assert_eq!(ld.contents(), "holder");
        assert_eq!(
            store.lock_contents("global", "/keyspace1/shard0").unwrap(),
            Some("holder".to_string())
        );
        assert!(ld.check(&ctx).await.is_ok());

        ld.unlock(&ctx).await.unwrap();
        assert_eq!(
            store.lock_contents("global", "/keyspace1/shard0").unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_check_ignores_release_state() {
        let (_store, conn) = setup();
        let ctx = LockContext::new();

        let ld = conn.lock(&ctx, "/keyspace1/shard0", "holder").await.unwrap();
        ld.unlock(&ctx).await.unwrap();
        assert!(ld.check(&ctx).await.is_ok());
        assert_eq!(
            ld.unlock(&ctx).await,
            Err(TopoError::NotLocked("/keyspace1/shard0".to_string()))
        );
    }

    #[tokio::test]
    async fn test_lock_directory_and_root() {
        let (_store, conn) = setup();
        let ctx = LockContext::new();

        let dir = conn.lock(&ctx, "/keyspace1", "dir").await.unwrap();
        let leaf = conn.lock(&ctx, "/keyspace1/shard0", "leaf").await.unwrap();
        let root = conn.lock(&ctx, "/", "root").await.unwrap();

        leaf.unlock(&ctx).await.unwrap();
        dir.unlock(&ctx).await.unwrap();
        root.unlock(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_missing_node() {
        let (_store, conn) = setup();
        let err = conn
            .lock(&LockContext::new(), "/keyspace1/shard9", "x")
            .await
            .unwrap_err();
        assert_eq!(err, TopoError::NoNode("/keyspace1/shard9".to_string()));
    }

    #[tokio::test]
    async fn test_lock_invalid_path() {
        let (_store, conn) = setup();
        let err = conn
            .lock(&LockContext::new(), "keyspace1", "x")
            .await
            .unwrap_err();
        assert_eq!(err, TopoError::InvalidPath("keyspace1".to_string()));
    }

    #[tokio::test]
    async fn test_double_unlock_is_rejected() {
        let (_store, conn) = setup();
        let ctx = LockContext::new();

        let ld = conn.lock(&ctx, "/keyspace1/shard0", "once").await.unwrap();
        ld.unlock(&ctx).await.unwrap();
        assert_eq!(
            ld.unlock(&ctx).await,
            Err(TopoError::NotLocked("/keyspace1/shard0".to_string()))
        );
    }

    #[tokio::test]
    async fn test_stale_descriptor_cannot_release_new_holder() {
        let (store, conn) = setup();
        let ctx = LockContext::new();

        let first = conn.lock(&ctx, "/keyspace1/shard0", "first").await.unwrap();
        first.unlock(&ctx).await.unwrap();
        let second = conn.lock(&ctx, "/keyspace1/shard0", "second").await.unwrap();

        assert_eq!(
            first.unlock(&ctx).await,
            Err(TopoError::NotLocked("/keyspace1/shard0".to_string()))
        );
        assert_eq!(
            store.lock_contents("global", "/keyspace1/shard0").unwrap(),
            Some("second".to_string())
        );
        second.unlock(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_unlock_deleted_node() {
        let (store, conn) = setup();
        let ctx = LockContext::new();

        let ld = conn.lock(&ctx, "/keyspace1/shard0", "x").await.unwrap();
        store.delete("global", "/keyspace1/shard0").unwrap();
        assert_eq!(
            ld.unlock(&ctx).await,
            Err(TopoError::NoNode("/keyspace1/shard0".to_string()))
        );
    }

    #[tokio::test]
    async fn test_try_lock() {
        let (_store, conn) = setup();
        let ctx = LockContext::new();

        let ld = conn.try_lock(&ctx, "/keyspace1/shard0", "a").await.unwrap();
        assert_eq!(
            conn.try_lock(&ctx, "/keyspace1/shard0", "b").await.unwrap_err(),
            TopoError::NodeExists("/keyspace1/shard0".to_string())
        );
        ld.unlock(&ctx).await.unwrap();
        let ld = conn.try_lock(&ctx, "/keyspace1/shard0", "b").await.unwrap();
        ld.unlock(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_fault_fails_lock_and_unlock() {
        let (store, conn) = setup();
        let ctx = LockContext::new();
        let ld = conn.lock(&ctx, "/keyspace1/shard0", "x").await.unwrap();

        store.set_fault("partitioned");
        let fault = TopoError::StoreFault("partitioned".to_string());
        assert_eq!(
            conn.lock(&ctx, "/keyspace1", "y").await.unwrap_err(),
            fault
        );
        assert_eq!(ld.unlock(&ctx).await, Err(fault));

        store.clear_fault();
        ld.unlock(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let (_store, conn) = setup();
        conn.close();
        assert_eq!(
            conn.lock(&LockContext::new(), "/keyspace1/shard0", "x")
                .await
                .unwrap_err(),
            TopoError::ConnectionClosed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_while_held() {
        let (store, conn) = setup();
        let ctx = LockContext::new();
        let ld = conn.lock(&ctx, "/keyspace1/shard0", "holder").await.unwrap();

        let err = conn
            .lock(
                &LockContext::with_timeout(Duration::from_millis(20)),
                "/keyspace1/shard0",
                "late",
            )
            .await
            .unwrap_err();
        assert_eq!(err, TopoError::Timeout("/keyspace1/shard0".to_string()));
        assert_eq!(
            store.lock_contents("global", "/keyspace1/shard0").unwrap(),
            Some("holder".to_string())
        );
        ld.unlock(&ctx).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_wait_bound() {
        let config = crate::config::TopoConfig {
            lock_wait_timeout_ms: Some(30),
            ..Default::default()
        };
        let store = NodeStore::from_config(&config);
        store.create("global", "/a", "").unwrap();
        let conn = store.connect("global").unwrap();

        let _held = conn.lock(&LockContext::new(), "/a", "holder").await.unwrap();
        let err = conn.lock(&LockContext::new(), "/a", "late").await.unwrap_err();
        assert_eq!(err, TopoError::Timeout("/a".to_string()));
    }

    #[tokio::test]
    async fn test_grant_notifies_lock_watchers() {
        let (store, conn) = setup();
        let ctx = LockContext::new();
        let mut watch = store
            .watch("global", "/keyspace1/shard0", WatchOptions::lock_changes())
            .unwrap();

        let ld = conn.lock(&ctx, "/keyspace1/shard0", "A-election").await.unwrap();
        ld.unlock(&ctx).await.unwrap();

        let events = watch.lock_events.as_mut().unwrap();
        assert_eq!(events.try_recv().unwrap(), "A-election");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_delete() {
        let (store, conn) = setup();
        let ctx = LockContext::new();
        let _held = conn.lock(&ctx, "/keyspace1/shard0", "holder").await.unwrap();

        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move {
                conn.lock(&LockContext::new(), "/keyspace1/shard0", "waiter")
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.delete("global", "/keyspace1").unwrap();

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err, TopoError::NoNode("/keyspace1/shard0".to_string()));
    }
}

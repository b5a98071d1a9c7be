//! In-memory node store
//!
//! One `NodeStore` owns the node trees of every cell. All clones share a
//! single mutex, which is the only serialization point for node contents,
//! lock state and watcher lists.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arbor_common::{GLOBAL_CELL, LockContext, Result, TopoError};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::TopoConfig;
use crate::conn::Conn;
use crate::metrics;
use crate::node::{Node, components, resolve};

pub(crate) struct StoreState {
    pub(crate) cells: BTreeMap<String, Node>,
    pub(crate) fault: Option<String>,
    pub(crate) next_generation: u64,
    pub(crate) next_watch_id: u64,
}

impl StoreState {
    pub(crate) fn check_fault(&self) -> Result<()> {
        match &self.fault {
            Some(msg) => Err(TopoError::StoreFault(msg.clone())),
            None => Ok(()),
        }
    }

    fn node(&mut self, cell: &str, path: &str) -> Result<&mut Node> {
        resolve(&mut self.cells, cell, path)?.ok_or_else(|| TopoError::NoNode(path.to_string()))
    }
}

struct StoreInner {
    state: Mutex<StoreState>,
    lock_wait_timeout: Option<Duration>,
}

/// Shared in-memory topology store
#[derive(Clone)]
pub struct NodeStore {
    inner: Arc<StoreInner>,
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl NodeStore {
    /// Create a store holding the global cell plus `cells`
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(cells, None)
    }

    pub fn from_config(config: &TopoConfig) -> Self {
        Self::build(config.cells.iter().cloned(), config.lock_wait_timeout())
    }

    fn build<I, S>(cells: I, lock_wait_timeout: Option<Duration>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut trees = BTreeMap::new();
        trees.insert(GLOBAL_CELL.to_string(), Node::default());
        for cell in cells {
            trees.entry(cell.into()).or_insert_with(Node::default);
        }

        info!(cells = trees.len(), "NodeStore initialized");

        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState {
                    cells: trees,
                    fault: None,
                    next_generation: 0,
                    next_watch_id: 0,
                }),
                lock_wait_timeout,
            }),
        }
    }

    /// Enter the store-wide critical section
    pub(crate) fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock()
    }

    /// Apply the configured wait bound to contexts that carry no deadline
    pub(crate) fn bounded_context(&self, ctx: &LockContext) -> LockContext {
        match (self.inner.lock_wait_timeout, ctx.deadline()) {
            (Some(timeout), None) => ctx
                .clone()
                .deadline_at(tokio::time::Instant::now() + timeout),
            _ => ctx.clone(),
        }
    }

    pub(crate) fn check_cell(&self, cell: &str) -> Result<()> {
        if !self.state().cells.contains_key(cell) {
            return Err(TopoError::NoCell(cell.to_string()));
        }
        Ok(())
    }

    pub fn connect(&self, cell: &str) -> Result<Conn> {
        self.check_cell(cell)?;
        Ok(Conn::new(self.clone(), cell))
    }

    /// Add a cell; returns false if it already existed
    pub fn add_cell(&self, cell: &str) -> bool {
        let mut state = self.state();
        if state.cells.contains_key(cell) {
            return false;
        }
        state.cells.insert(cell.to_string(), Node::default());
        debug!(cell = %cell, "Cell added");
        true
    }

    pub fn cells(&self) -> Vec<String> {
        self.state().cells.keys().cloned().collect()
    }

    /// Inject a store-wide fault; every subsequent operation fails with it
    pub fn set_fault(&self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!(fault = %msg, "Store fault injected");
        self.state().fault = Some(msg);
    }

    pub fn clear_fault(&self) {
        self.state().fault = None;
    }

    pub fn fault(&self) -> Option<String> {
        self.state().fault.clone()
    }

    /// Create a node, creating missing parent directories on the way
    pub fn create(&self, cell: &str, path: &str, contents: impl Into<Vec<u8>>) -> Result<u64> {
        let mut state = self.state();
        state.check_fault()?;

        let parts = components(path)?;
        let Some((leaf, parents)) = parts.split_last() else {
            return Err(TopoError::NodeExists(path.to_string()));
        };

        let mut node = state
            .cells
            .get_mut(cell)
            .ok_or_else(|| TopoError::NoCell(cell.to_string()))?;
        for name in parents {
            node = node.children.entry(name.to_string()).or_default();
        }
        if node.children.contains_key(*leaf) {
            return Err(TopoError::NodeExists(path.to_string()));
        }
        node.children
            .insert(leaf.to_string(), Node::with_contents(contents.into()));

        debug!(cell = %cell, path = %path, "Node created");
        Ok(1)
    }

    /// Replace a node's contents and notify contents watchers
    pub fn update(&self, cell: &str, path: &str, contents: impl Into<Vec<u8>>) -> Result<u64> {
        let mut state = self.state();
        state.check_fault()?;

        let node = state.node(cell, path)?;
        node.contents = contents.into();
        node.version += 1;
        node.notify_contents();
        Ok(node.version)
    }

    /// Returns the node contents and version
    pub fn get(&self, cell: &str, path: &str) -> Result<(Vec<u8>, u64)> {
        let mut state = self.state();
        state.check_fault()?;

        let node = state.node(cell, path)?;
        Ok((node.contents.clone(), node.version))
    }

    pub fn children(&self, cell: &str, path: &str) -> Result<Vec<String>> {
        let mut state = self.state();
        state.check_fault()?;

        let node = state.node(cell, path)?;
        Ok(node.children.keys().cloned().collect())
    }

    /// Delete a node and its subtree
    ///
    /// Locks held in the subtree are released so blocked waiters wake and
    /// observe `NoNode`. Watchers of removed nodes are dropped.
    pub fn delete(&self, cell: &str, path: &str) -> Result<()> {
        let mut state = self.state();
        state.check_fault()?;

        let parts = components(path)?;
        let Some((leaf, parents)) = parts.split_last() else {
            return Err(TopoError::InvalidPath(path.to_string()));
        };

        let parent = state
            .cells
            .get_mut(cell)
            .and_then(|root| root.child(parents))
            .ok_or_else(|| TopoError::NoNode(path.to_string()))?;
        let mut removed = parent
            .children
            .remove(*leaf)
            .ok_or_else(|| TopoError::NoNode(path.to_string()))?;

        let released = removed.release_subtree();
        for _ in 0..released {
            metrics::record_released(cell);
        }

        debug!(cell = %cell, path = %path, released, "Node deleted");
        Ok(())
    }

    /// Holder contents while the node is locked, `None` while unlocked
    pub fn lock_contents(&self, cell: &str, path: &str) -> Result<Option<String>> {
        let mut state = self.state();
        state.check_fault()?;

        let node = state.node(cell, path)?;
        Ok(node.is_locked().then(|| node.lock_contents.clone()))
    }
}

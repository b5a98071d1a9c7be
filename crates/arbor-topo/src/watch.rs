//! Node watches
//!
//! A watch registers interest in lock grants, contents changes, or both.
//! Events are pushed while the store mutex is held, so the order a watcher
//! observes is the order the transitions happened.

use arbor_common::{Result, TopoError};
use tokio::sync::mpsc;
use tracing::debug;

use crate::node::{Watcher, resolve};
use crate::store::NodeStore;

/// What a watch wants to hear about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Receive the holder contents of every lock grant
    pub lock_changes: bool,
    /// Receive the new contents of every update
    pub contents: bool,
}

impl WatchOptions {
    pub fn lock_changes() -> Self {
        Self {
            lock_changes: true,
            contents: false,
        }
    }

    pub fn contents() -> Self {
        Self {
            lock_changes: false,
            contents: true,
        }
    }
}

/// Receiving side of a registered watch
///
/// The channels end once the watch is removed or its node is deleted.
#[derive(Debug)]
pub struct Watch {
    pub id: u64,
    pub lock_events: Option<mpsc::UnboundedReceiver<String>>,
    pub changes: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl NodeStore {
    /// Register a watch on an existing node
    pub fn watch(&self, cell: &str, path: &str, options: WatchOptions) -> Result<Watch> {
        let mut state = self.state();
        state.check_fault()?;

        let id = state.next_watch_id;
        let node = resolve(&mut state.cells, cell, path)?
            .ok_or_else(|| TopoError::NoNode(path.to_string()))?;

        let (lock_tx, lock_events) = channel_if(options.lock_changes);
        let (contents_tx, changes) = channel_if(options.contents);
        node.watches.push(Watcher {
            id,
            lock: lock_tx,
            contents: contents_tx,
        });
        state.next_watch_id += 1;

        debug!(cell = %cell, path = %path, watch_id = id, ?options, "Watch registered");
        Ok(Watch {
            id,
            lock_events,
            changes,
        })
    }

    /// Remove a watch; returns false if it was not registered on that node
    pub fn unwatch(&self, cell: &str, path: &str, id: u64) -> Result<bool> {
        let mut state = self.state();
        state.check_fault()?;

        let node = resolve(&mut state.cells, cell, path)?
            .ok_or_else(|| TopoError::NoNode(path.to_string()))?;
        let before = node.watches.len();
        node.watches.retain(|w| w.id != id);
        Ok(node.watches.len() != before)
    }
}

type Channel<T> = (
    Option<mpsc::UnboundedSender<T>>,
    Option<mpsc::UnboundedReceiver<T>>,
);

fn channel_if<T>(wanted: bool) -> Channel<T> {
    if !wanted {
        return (None, None);
    }
    let (tx, rx) = mpsc::unbounded_channel();
    (Some(tx), Some(rx))
}

//! Node tree data model
//!
//! Nodes are plain data guarded by the store-wide mutex. Nothing in this
//! module locks anything on its own.

use std::collections::BTreeMap;

use arbor_common::{PATH_SEPARATOR, Result, TopoError};
use tokio::sync::{mpsc, watch};
use tracing::trace;

/// One-shot broadcast installed on a node for a single locked period
///
/// Waiters subscribe while the store mutex is held. `fire` drops the sender,
/// which completes every outstanding subscription at once. A fired signal is
/// never reused; the next grant installs a new one.
pub(crate) struct LockSignal {
    generation: u64,
    tx: watch::Sender<()>,
}

impl LockSignal {
    pub(crate) fn new(generation: u64) -> Self {
        let (tx, _) = watch::channel(());
        Self { generation, tx }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn subscribe(&self) -> LockWaiter {
        LockWaiter {
            rx: self.tx.subscribe(),
        }
    }

    pub(crate) fn fire(self) {
        drop(self.tx);
    }
}

/// Subscription to a `LockSignal`
pub(crate) struct LockWaiter {
    rx: watch::Receiver<()>,
}

impl LockWaiter {
    /// Completes when the signal this waiter subscribed to has fired
    pub(crate) async fn released(mut self) {
        while self.rx.changed().await.is_ok() {}
    }
}

/// Registered watch on a node
pub(crate) struct Watcher {
    pub(crate) id: u64,
    pub(crate) lock: Option<mpsc::UnboundedSender<String>>,
    pub(crate) contents: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl Watcher {
    pub(crate) fn is_closed(&self) -> bool {
        self.lock.as_ref().is_none_or(|tx| tx.is_closed())
            && self.contents.as_ref().is_none_or(|tx| tx.is_closed())
    }
}

#[derive(Default)]
pub(crate) struct Node {
    pub(crate) contents: Vec<u8>,
    pub(crate) version: u64,
    pub(crate) children: BTreeMap<String, Node>,
    pub(crate) lock: Option<LockSignal>,
    pub(crate) lock_contents: String,
    pub(crate) watches: Vec<Watcher>,
}

impl Node {
    pub(crate) fn with_contents(contents: Vec<u8>) -> Self {
        Self {
            contents,
            version: 1,
            ..Default::default()
        }
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub(crate) fn child(&mut self, components: &[&str]) -> Option<&mut Node> {
        components
            .iter()
            .try_fold(self, |node, name| node.children.get_mut(*name))
    }

    /// Deliver grant contents to lock-interested watchers in registration order
    pub(crate) fn notify_lock(&mut self, contents: &str) {
        for watcher in &self.watches {
            if let Some(tx) = &watcher.lock {
                let _ = tx.send(contents.to_string());
            }
        }
        self.prune_watches();
    }

    pub(crate) fn notify_contents(&mut self) {
        for watcher in &self.watches {
            if let Some(tx) = &watcher.contents {
                let _ = tx.send(self.contents.clone());
            }
        }
        self.prune_watches();
    }

    /// Drop registrations whose receivers are all gone
    fn prune_watches(&mut self) {
        let before = self.watches.len();
        self.watches.retain(|watcher| !watcher.is_closed());
        let pruned = before - self.watches.len();
        if pruned > 0 {
            trace!(pruned, "Removed watchers with dropped receivers");
        }
    }

    /// Release every lock in this subtree, returning how many were held
    pub(crate) fn release_subtree(&mut self) -> usize {
        let mut released = 0;
        if let Some(signal) = self.lock.take() {
            signal.fire();
            self.lock_contents.clear();
            released += 1;
        }
        for child in self.children.values_mut() {
            released += child.release_subtree();
        }
        released
    }
}

/// Split an absolute path into its non-empty components
pub(crate) fn components(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with(PATH_SEPARATOR) {
        return Err(TopoError::InvalidPath(path.to_string()));
    }
    Ok(path
        .split(PATH_SEPARATOR)
        .filter(|part| !part.is_empty())
        .collect())
}

/// Resolve `path` in `cell`. A missing cell resolves like a missing node.
pub(crate) fn resolve<'a>(
    cells: &'a mut BTreeMap<String, Node>,
    cell: &str,
    path: &str,
) -> Result<Option<&'a mut Node>> {
    let parts = components(path)?;
    Ok(cells.get_mut(cell).and_then(|root| root.child(&parts)))
}

//! Cell-scoped connections to a `NodeStore`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arbor_common::{LockContext, Result, SessionEstablisher, TopoError};
use async_trait::async_trait;
use tracing::debug;

use crate::store::NodeStore;

/// Default session check: succeeds until the connection is closed
struct DialSession {
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl SessionEstablisher for DialSession {
    async fn ensure_session(&self, _ctx: &LockContext) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TopoError::ConnectionClosed);
        }
        Ok(())
    }
}

/// Connection to one cell of a store
#[derive(Clone)]
pub struct Conn {
    store: NodeStore,
    cell: Arc<str>,
    session_id: Arc<str>,
    closed: Arc<AtomicBool>,
    session: Arc<dyn SessionEstablisher>,
}

impl Conn {
    pub(crate) fn new(store: NodeStore, cell: &str) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        let session = Arc::new(DialSession {
            closed: closed.clone(),
        });
        Self::with_parts(store, cell, closed, session)
    }

    fn with_parts(
        store: NodeStore,
        cell: &str,
        closed: Arc<AtomicBool>,
        session: Arc<dyn SessionEstablisher>,
    ) -> Self {
        let session_id: Arc<str> = uuid::Uuid::new_v4().to_string().into();
        debug!(cell = %cell, session_id = %session_id, "Connection opened");
        Self {
            store,
            cell: cell.into(),
            session_id,
            closed,
            session,
        }
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn cell(&self) -> &str {
        &self.cell
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn session(&self) -> &dyn SessionEstablisher {
        self.session.as_ref()
    }

    /// Close the connection. Later lock attempts through the default
    /// session check fail with `ConnectionClosed`.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(cell = %self.cell, session_id = %self.session_id, "Connection closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl NodeStore {
    /// Connect with a caller-supplied session establisher
    pub fn connect_with_session(
        &self,
        cell: &str,
        session: Arc<dyn SessionEstablisher>,
    ) -> Result<Conn> {
        self.check_cell(cell)?;
        Ok(Conn::with_parts(
            self.clone(),
            cell,
            Arc::new(AtomicBool::new(false)),
            session,
        ))
    }
}

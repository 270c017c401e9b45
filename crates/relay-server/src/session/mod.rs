//! The single control-client session.
//!
//! [`Session`] owns the live connection slot, the pending-request table and
//! the current group snapshot. All three sit behind one lock that is never
//! held across an await point, so the receive loop and webhook callers only
//! ever contend for short critical sections.

mod connection;
mod correlator;
mod dispatcher;
mod pending;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use relay_core::{GroupNames, Groups, RelayError, TypedMessage};

pub use connection::ConnectionId;
pub use dispatcher::Dispatch;

use connection::ControlConnection;
use pending::PendingTable;

struct SessionState {
    connection: Option<ControlConnection>,
    pending: PendingTable,
    snapshot: Option<Arc<Groups>>,
    group_names: GroupNames,
}

impl SessionState {
    fn install_snapshot(&mut self, groups: Groups) -> Arc<Groups> {
        let groups = Arc::new(groups);
        self.group_names = groups.names();
        self.snapshot = Some(Arc::clone(&groups));
        groups
    }

    /// Queue already-serialized `text` on the live connection.
    fn enqueue(&self, text: String, kind: &str) -> Result<(), RelayError> {
        let connection = self.connection.as_ref().ok_or(RelayError::NotConnected)?;
        match connection.tx.try_send(text) {
            Ok(()) => {
                debug!(connection_id = %connection.id, kind = %kind, "queued message for control client");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(RelayError::SendQueueFull),
            Err(TrySendError::Closed(_)) => Err(RelayError::NotConnected),
        }
    }
}

pub struct Session {
    state: Mutex<SessionState>,
    /// Serialises status refreshes so same-type requests queue.
    refresh_gate: tokio::sync::Mutex<()>,
    request_timeout: Duration,
    max_send_queue: usize,
}

impl Session {
    pub fn new(request_timeout: Duration, max_send_queue: usize) -> Self {
        Self {
            state: Mutex::new(SessionState {
                connection: None,
                pending: PendingTable::new(),
                snapshot: None,
                group_names: GroupNames::default(),
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
            request_timeout,
            max_send_queue,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Install a new control connection, replacing any previous one.
    ///
    /// Dropping the old sender ends its writer task. Waiters whose request
    /// went out on the old connection are failed with `Disconnected`.
    pub fn attach(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let (connection, rx) = ControlConnection::open(self.max_send_queue);
        let id = connection.id.clone();

        let mut state = self.state.lock();
        if let Some(previous) = state.connection.replace(connection) {
            let failed = state.pending.fail_all(&RelayError::Disconnected);
            warn!(
                previous = %previous.id,
                current = %id,
                failed_waiters = failed,
                "control client replaced by new connection"
            );
        } else {
            info!(connection_id = %id, "control client attached");
        }
        (id, rx)
    }

    /// Clear the slot if `id` is still the live connection. A late detach
    /// from a replaced socket does nothing.
    pub fn detach(&self, id: &ConnectionId) -> bool {
        let mut state = self.state.lock();
        if state.connection.as_ref().map(|c| &c.id) != Some(id) {
            debug!(connection_id = %id, "ignoring detach of stale connection");
            return false;
        }
        state.connection = None;
        let failed = state.pending.fail_all(&RelayError::Disconnected);
        info!(connection_id = %id, failed_waiters = failed, "control client detached");
        true
    }

    /// Drop the live connection during shutdown.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if let Some(connection) = state.connection.take() {
            let _ = state.pending.fail_all(&RelayError::Disconnected);
            info!(connection_id = %connection.id, "control client closed for shutdown");
        }
    }

    /// Queue `message` for the control client. Never blocks.
    pub fn send(&self, message: &TypedMessage) -> Result<(), RelayError> {
        let text = message.to_json()?;
        self.state.lock().enqueue(text, &message.kind)
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connection.is_some()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.state.lock().connection.as_ref().map(|c| c.id.clone())
    }

    pub fn snapshot(&self) -> Option<Arc<Groups>> {
        self.state.lock().snapshot.clone()
    }

    pub fn group_names(&self) -> GroupNames {
        self.state.lock().group_names.clone()
    }

    /// Replace the snapshot wholesale and re-derive the cached names.
    pub fn install_snapshot(&self, groups: Groups) -> Arc<Groups> {
        self.state.lock().install_snapshot(groups)
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn has_pending(&self, kind: &str) -> bool {
        self.state.lock().pending.contains(kind)
    }
}

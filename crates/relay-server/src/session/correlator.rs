use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use relay_core::{ControlMessage, Groups, MessageKind, RelayError, TypedMessage};

use super::pending::WaiterId;
use super::Session;

/// Removes a pending entry when the awaiting call finishes or is dropped.
struct PendingGuard<'a> {
    session: &'a Session,
    kind: String,
    id: WaiterId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let _ = self.session.state.lock().pending.remove(&self.kind, self.id);
    }
}

impl Session {
    /// Send `request` and wait up to `timeout` for the next message of type
    /// `reply_kind`.
    ///
    /// Only one caller may wait on a given reply type; a second one gets
    /// `AlreadyPending`. The table entry is gone once this returns, whether
    /// the reply arrived, the deadline passed, or the future was dropped.
    #[instrument(skip(self, request), fields(request_kind = %request.kind))]
    pub async fn await_typed_response(
        &self,
        request: &TypedMessage,
        reply_kind: &str,
        timeout: Duration,
    ) -> Result<TypedMessage, RelayError> {
        let text = request.to_json()?;
        // Register and enqueue under one lock so a connection swap lands
        // either before both (send fails) or after both (waiter is failed).
        let (id, rx) = {
            let mut state = self.state.lock();
            let (id, rx) = state.pending.register(reply_kind)?;
            if let Err(e) = state.enqueue(text, &request.kind) {
                let _ = state.pending.remove(reply_kind, id);
                return Err(e);
            }
            (id, rx)
        };
        let _guard = PendingGuard {
            session: self,
            kind: reply_kind.to_string(),
            id,
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(delivery)) => delivery,
            // Sender dropped without a value: the table was torn down.
            Ok(Err(_)) => Err(RelayError::Disconnected),
            Err(_) => {
                warn!(reply = reply_kind, ?timeout, "no reply from control client");
                Err(RelayError::Timeout {
                    kind: reply_kind.to_string(),
                    after: timeout,
                })
            }
        }
    }

    /// Ask the control client for its current groups and install them.
    ///
    /// Concurrent callers queue behind one another, each within its own
    /// `timeout` once it reaches the front.
    pub async fn refresh_groups(&self, timeout: Duration) -> Result<Arc<Groups>, RelayError> {
        let _turn = self.refresh_gate.lock().await;

        let Some(reply_kind) = MessageKind::Status.reply_kind() else {
            return Err(RelayError::protocol("status has no reply type"));
        };
        let reply = self
            .await_typed_response(&TypedMessage::status_request(), reply_kind.as_str(), timeout)
            .await?;

        match reply.decode()? {
            ControlMessage::GroupState(groups) => {
                let installed = self.install_snapshot(groups);
                debug!(groups = installed.len(), "snapshot refreshed");
                Ok(installed)
            }
            other => Err(RelayError::protocol(format!(
                "expected group_state reply, got {other:?}"
            ))),
        }
    }
}

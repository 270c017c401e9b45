use tracing::{debug, warn};

use relay_core::{ControlMessage, MessageKind, TypedMessage};

use super::Session;

/// What the dispatcher did with one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Handed to the caller waiting for this type.
    Delivered,
    /// Unsolicited `group_state` replaced the snapshot.
    SnapshotReplaced { groups: usize },
    /// Logged and discarded.
    Dropped,
}

impl Session {
    /// Route one message read from the control connection.
    ///
    /// Runs on the receive loop and never blocks: delivery is a one-shot
    /// handoff and the entry is left for the correlator to remove.
    pub fn dispatch(&self, message: TypedMessage) -> Dispatch {
        let mut state = self.state.lock();
        let message = match state.pending.deliver(message) {
            Ok(()) => return Dispatch::Delivered,
            Err(unclaimed) => unclaimed,
        };

        if !message.is(MessageKind::GroupState) {
            warn!(kind = %message.kind, "dropping message of unknown type");
            return Dispatch::Dropped;
        }

        match message.decode() {
            Ok(ControlMessage::GroupState(groups)) => {
                let installed = state.install_snapshot(groups);
                debug!(groups = installed.len(), "snapshot replaced by unsolicited group_state");
                Dispatch::SnapshotReplaced {
                    groups: installed.len(),
                }
            }
            Ok(_) => Dispatch::Dropped,
            Err(e) => {
                warn!(error = %e, error_kind = e.error_kind(), "dropping malformed group_state");
                Dispatch::Dropped
            }
        }
    }
}

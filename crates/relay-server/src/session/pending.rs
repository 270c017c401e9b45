//! Pending-request table: one waiter per expected reply type.

use std::collections::HashMap;

use tokio::sync::oneshot;

use relay_core::{RelayError, TypedMessage};

pub type Delivery = Result<TypedMessage, RelayError>;

/// Identifies one registration, so a late removal cannot evict a newer waiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

struct Waiter {
    id: WaiterId,
    /// Taken on delivery or failure; the entry itself stays until removed.
    deliver: Option<oneshot::Sender<Delivery>>,
}

/// Map from reply type to the caller blocked on it.
///
/// Not synchronized itself; [`Session`](super::Session) keeps it behind the
/// session lock.
#[derive(Default)]
pub struct PendingTable {
    waiters: HashMap<String, Waiter>,
    next_id: u64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a waiter for `kind`. Fails if one is already installed.
    pub fn register(
        &mut self,
        kind: &str,
    ) -> Result<(WaiterId, oneshot::Receiver<Delivery>), RelayError> {
        if self.waiters.contains_key(kind) {
            return Err(RelayError::AlreadyPending(kind.to_string()));
        }
        self.next_id += 1;
        let id = WaiterId(self.next_id);
        let (tx, rx) = oneshot::channel();
        let _ = self.waiters.insert(
            kind.to_string(),
            Waiter {
                id,
                deliver: Some(tx),
            },
        );
        Ok((id, rx))
    }

    /// Hand `message` to the waiter for its type without blocking.
    ///
    /// Returns the message back when nobody is waiting for it: no entry,
    /// an entry that already received its reply, or a caller that has gone.
    pub fn deliver(&mut self, message: TypedMessage) -> Result<(), TypedMessage> {
        let Some(tx) = self
            .waiters
            .get_mut(&message.kind)
            .and_then(|w| w.deliver.take())
        else {
            return Err(message);
        };
        match tx.send(Ok(message)) {
            Err(Ok(message)) => Err(message),
            Ok(()) | Err(Err(_)) => Ok(()),
        }
    }

    /// Remove the entry for `kind` if it is still `id`'s. Idempotent.
    pub fn remove(&mut self, kind: &str, id: WaiterId) -> bool {
        if self.waiters.get(kind).is_some_and(|w| w.id == id) {
            let _ = self.waiters.remove(kind);
            true
        } else {
            false
        }
    }

    /// Fail every waiter that has not been answered yet. Entries remain for
    /// their owners to remove. Returns how many waiters were failed.
    pub fn fail_all(&mut self, error: &RelayError) -> usize {
        let mut failed = 0;
        for waiter in self.waiters.values_mut() {
            if let Some(tx) = waiter.deliver.take() {
                let _ = tx.send(Err(error.clone()));
                failed += 1;
            }
        }
        failed
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.waiters.contains_key(kind)
    }

    /// Whether a waiter for `kind` is still blocked on a reply.
    #[cfg(test)]
    pub fn is_awaiting(&self, kind: &str) -> bool {
        self.waiters.get(kind).is_some_and(|w| w.deliver.is_some())
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifies one accepted control connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl Default for ConnectionId {
    fn default() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl ConnectionId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The live control client: its id and the queue feeding its writer task.
pub(crate) struct ControlConnection {
    pub id: ConnectionId,
    pub tx: mpsc::Sender<String>,
}

impl ControlConnection {
    pub fn open(max_send_queue: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(max_send_queue.max(1));
        let connection = Self {
            id: ConnectionId::new(),
            tx,
        };
        (connection, rx)
    }
}

use std::time::Duration;

/// Failures on the path between an inbound SMS and the control client.
///
/// Correlator and connection errors are recovered by the webhook handler,
/// which logs them and replies to the user with [`RelayError::user_message`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    // Control channel
    #[error("control client not connected")]
    NotConnected,
    #[error("control client disconnected")]
    Disconnected,
    #[error("control client send queue full")]
    SendQueueFull,

    // Correlation
    #[error("timeout after {after:?} waiting for {kind}")]
    Timeout { kind: String, after: Duration },
    #[error("a request awaiting {0} is already pending")]
    AlreadyPending(String),

    // Payloads
    #[error("protocol error: {0}")]
    Protocol(String),

    // Collaborators
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl RelayError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::Disconnected => "disconnected",
            Self::SendQueueFull => "send_queue_full",
            Self::Timeout { .. } => "timeout",
            Self::AlreadyPending(_) => "already_pending",
            Self::Protocol(_) => "protocol_error",
            Self::Upstream(_) => "upstream_error",
        }
    }

    /// Apologetic SMS text sent back to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotConnected | Self::Disconnected => {
                "Sorry, your home controller is offline right now. Please try again later."
            }
            Self::Timeout { .. } | Self::SendQueueFull | Self::AlreadyPending(_) => {
                "Sorry, your home controller did not respond in time. Please try again."
            }
            Self::Protocol(_) => "Sorry, I couldn't understand that request. Please try rephrasing it.",
            Self::Upstream(_) => "Sorry, something went wrong while processing your message.",
        }
    }
}

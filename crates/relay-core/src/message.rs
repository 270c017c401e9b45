use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::UpdateCommand;
use crate::errors::RelayError;
use crate::group::{Group, Groups};

/// The small closed set of message tags the relay understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Server → client: push the current `group_state`.
    Status,
    /// Server → client: change one group.
    Update,
    /// Client → server: full group list, solicited or not.
    GroupState,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Update => "update",
            Self::GroupState => "group_state",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "status" => Some(Self::Status),
            "update" => Some(Self::Update),
            "group_state" => Some(Self::GroupState),
            _ => None,
        }
    }

    /// The message type a control client answers this request with.
    pub fn reply_kind(self) -> Option<Self> {
        match self {
            Self::Status => Some(Self::GroupState),
            Self::Update | Self::GroupState => None,
        }
    }
}

/// Wire unit on the control channel: `{"type": ..., "data": ...}`.
///
/// `kind` is the dispatch and correlation key. `data` stays opaque until
/// [`TypedMessage::decode`] is called for a known tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypedMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GroupStatePayload {
    groups: Vec<Group>,
}

impl TypedMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn status_request() -> Self {
        Self::new(MessageKind::Status.as_str(), Value::Null)
    }

    pub fn update(command: &UpdateCommand) -> Result<Self, RelayError> {
        let data = serde_json::to_value(command)
            .map_err(|e| RelayError::protocol(format!("unserializable update: {e}")))?;
        Ok(Self::new(MessageKind::Update.as_str(), data))
    }

    pub fn group_state(groups: &Groups) -> Self {
        let data = serde_json::json!({ "groups": groups });
        Self::new(MessageKind::GroupState.as_str(), data)
    }

    pub fn from_json(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text)
            .map_err(|e| RelayError::protocol(format!("malformed control message: {e}")))
    }

    pub fn to_json(&self) -> Result<String, RelayError> {
        serde_json::to_string(self)
            .map_err(|e| RelayError::protocol(format!("unserializable control message: {e}")))
    }

    pub fn known_kind(&self) -> Option<MessageKind> {
        MessageKind::from_tag(&self.kind)
    }

    pub fn is(&self, kind: MessageKind) -> bool {
        self.kind == kind.as_str()
    }

    /// Decode the payload according to the tag.
    pub fn decode(&self) -> Result<ControlMessage, RelayError> {
        match self.known_kind() {
            Some(MessageKind::Status) => Ok(ControlMessage::Status),
            Some(MessageKind::Update) => {
                let command: UpdateCommand = serde_json::from_value(self.data.clone())
                    .map_err(|e| RelayError::protocol(format!("invalid update payload: {e}")))?;
                Ok(ControlMessage::Update(command))
            }
            Some(MessageKind::GroupState) => {
                let payload: GroupStatePayload = serde_json::from_value(self.data.clone())
                    .map_err(|e| RelayError::protocol(format!("invalid group_state payload: {e}")))?;
                Ok(ControlMessage::GroupState(Groups::new(payload.groups)?))
            }
            None => Ok(ControlMessage::Unknown(self.clone())),
        }
    }
}

/// A decoded control-channel message.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlMessage {
    Status,
    Update(UpdateCommand),
    GroupState(Groups),
    Unknown(TypedMessage),
}

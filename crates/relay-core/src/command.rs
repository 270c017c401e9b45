//! Commands produced by the natural-language translator.
//!
//! The translator answers with one of two JSON shapes, optionally wrapped in
//! a Markdown code fence:
//!
//! - `{"type":"status","data":{"room":["Kitchen"]}}`
//! - `{"type":"update","data":{"group":"Kitchen","isOn":true,"brightness":127}}`

use serde::{Deserialize, Serialize};

use crate::errors::RelayError;
use crate::group::{Group, MAX_BRIGHTNESS};

/// Change one group's state. Forwarded to the control client as-is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommand {
    pub group: String,
    pub is_on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
}

impl UpdateCommand {
    pub fn new(group: impl Into<String>, is_on: bool, brightness: Option<u8>) -> Self {
        Self {
            group: group.into(),
            is_on,
            brightness,
        }
    }

    /// Fill in a missing brightness.
    ///
    /// Turning off always carries 0. Turning on keeps the group's current
    /// brightness when it is lit, and goes to full brightness otherwise.
    pub fn with_default_brightness(mut self, current: Option<&Group>) -> Self {
        if !self.is_on {
            self.brightness = Some(0);
            return self;
        }
        if self.brightness.is_none() {
            let lit = current.filter(|g| g.is_on && g.brightness > 0);
            self.brightness = Some(lit.map_or(MAX_BRIGHTNESS, |g| g.brightness));
        }
        self
    }

    /// The state the group is expected to be in once applied.
    pub fn expected_state(&self) -> Group {
        Group::new(self.group.clone(), self.is_on, self.brightness.unwrap_or(0))
    }
}

/// A translated user request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Status { rooms: Vec<String> },
    Update(UpdateCommand),
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum RawCommand {
    Status(RawStatus),
    Update(RawUpdate),
}

#[derive(Deserialize)]
struct RawStatus {
    #[serde(default)]
    room: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUpdate {
    group: String,
    is_on: bool,
    #[serde(default)]
    brightness: Option<i64>,
}

impl Command {
    /// Parse translator output, tolerating a surrounding code fence.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let body = strip_code_fence(raw);
        let parsed: RawCommand = serde_json::from_str(body)
            .map_err(|e| RelayError::protocol(format!("unrecognized translator output: {e}")))?;
        Ok(match parsed {
            RawCommand::Status(status) => Self::Status { rooms: status.room },
            RawCommand::Update(update) => {
                if update.group.trim().is_empty() {
                    return Err(RelayError::protocol("update is missing a group"));
                }
                Self::Update(UpdateCommand {
                    group: update.group.trim().to_string(),
                    is_on: update.is_on,
                    brightness: update
                        .brightness
                        .map(|b| b.clamp(0, i64::from(MAX_BRIGHTNESS)) as u8),
                })
            }
        })
    }
}

/// Remove a Markdown code fence (```` ``` ```` or ```` ```json ````) around `raw`.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

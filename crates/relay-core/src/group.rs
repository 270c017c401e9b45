use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// Highest raw brightness a control client reports for a group.
pub const MAX_BRIGHTNESS: u8 = 254;

/// A named collection of lights with aggregate on/off and brightness state.
///
/// Brightness is only meaningful while the group is on. On the wire a group
/// carries its state as a bridge-style `action: {on, bri}` object; flat
/// `isOn`/`brightness` fields are accepted when `action` is absent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireGroup", into = "WireGroup")]
pub struct Group {
    pub name: String,
    pub is_on: bool,
    pub brightness: u8,
    pub lights: Vec<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGroup {
    name: String,
    #[serde(default)]
    lights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<WireAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    brightness: Option<u8>,
}

#[derive(Serialize, Deserialize)]
struct WireAction {
    #[serde(default)]
    on: bool,
    #[serde(default)]
    bri: u8,
}

impl TryFrom<WireGroup> for Group {
    type Error = String;

    fn try_from(wire: WireGroup) -> Result<Self, Self::Error> {
        let (is_on, brightness) = match (wire.action, wire.is_on) {
            (Some(action), _) => (action.on, action.bri),
            (None, Some(is_on)) => (is_on, wire.brightness.unwrap_or(0)),
            (None, None) => return Err(format!("group {} has no on/off state", wire.name)),
        };
        Ok(Self {
            name: wire.name,
            is_on,
            brightness,
            lights: wire.lights,
        })
    }
}

impl From<Group> for WireGroup {
    fn from(group: Group) -> Self {
        Self {
            name: group.name,
            lights: group.lights,
            action: Some(WireAction {
                on: group.is_on,
                bri: group.brightness,
            }),
            is_on: None,
            brightness: None,
        }
    }
}

impl Group {
    pub fn new(name: impl Into<String>, is_on: bool, brightness: u8) -> Self {
        Self {
            name: name.into(),
            is_on,
            brightness,
            lights: Vec::new(),
        }
    }

    /// Raw brightness scaled to a whole percentage.
    pub fn brightness_percent(&self) -> u32 {
        let raw = f64::from(self.brightness.min(MAX_BRIGHTNESS));
        (raw / f64::from(MAX_BRIGHTNESS) * 100.0).round() as u32
    }

    /// One human-readable status line, without the trailing newline.
    pub fn status_line(&self) -> String {
        if !self.is_on {
            format!("{}: Off", self.name)
        } else if self.brightness > 0 {
            format!("{}: On, Brightness: {}%", self.name, self.brightness_percent())
        } else {
            format!("{}: On", self.name)
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"{{"name": {}, "lights": {:?}, "isOn": {}, "brightness": {}}}"#,
            self.name, self.lights, self.is_on, self.brightness
        )
    }
}

/// Ordered snapshot of every group the control client reported.
///
/// Replaced wholesale on each `group_state` message, never edited in place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Groups(Vec<Group>);

impl Groups {
    /// Build a snapshot, rejecting out-of-range brightness and duplicate names.
    pub fn new(groups: Vec<Group>) -> Result<Self, RelayError> {
        let snapshot = Self(groups);
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        let mut seen = HashSet::with_capacity(self.0.len());
        for group in &self.0 {
            if group.brightness > MAX_BRIGHTNESS {
                return Err(RelayError::protocol(format!(
                    "group {} brightness {} exceeds {MAX_BRIGHTNESS}",
                    group.name, group.brightness
                )));
            }
            if !seen.insert(group.name.as_str()) {
                return Err(RelayError::protocol(format!(
                    "duplicate group name: {}",
                    group.name
                )));
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Group> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Group> {
        self.0.iter().find(|g| g.name == name)
    }

    /// Case-insensitive lookup, for names that came out of free text.
    pub fn find(&self, name: &str) -> Option<&Group> {
        let name = name.trim();
        self.get(name)
            .or_else(|| self.0.iter().find(|g| g.name.eq_ignore_ascii_case(name)))
    }

    pub fn names(&self) -> GroupNames {
        GroupNames(self.0.iter().map(|g| g.name.clone()).collect())
    }

    /// Map loosely-typed requested names onto canonical group names.
    ///
    /// An empty request or one containing `all` selects every group.
    /// Names that match nothing are dropped.
    pub fn resolve_names<S: AsRef<str>>(&self, requested: &[S]) -> GroupNames {
        let wants_all = requested.is_empty()
            || requested
                .iter()
                .any(|n| n.as_ref().trim().eq_ignore_ascii_case("all"));
        if wants_all {
            return self.names();
        }
        let mut names = Vec::new();
        for name in requested {
            if let Some(group) = self.find(name.as_ref()) {
                if !names.contains(&group.name) {
                    names.push(group.name.clone());
                }
            }
        }
        GroupNames(names)
    }

    /// One status line per snapshot group named in `requested`, in snapshot
    /// order. Requested names missing from the snapshot produce no line.
    pub fn format_status<S: AsRef<str>>(&self, requested: &[S]) -> String {
        let mut out = String::new();
        for group in &self.0 {
            if requested.iter().any(|n| n.as_ref() == group.name) {
                out.push_str(&group.status_line());
                out.push('\n');
            }
        }
        out
    }
}

impl fmt::Display for Groups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in &self.0 {
            writeln!(f, "{group}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Groups {
    type Item = &'a Group;
    type IntoIter = std::slice::Iter<'a, Group>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Group names derived from the current snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupNames(Vec<String>);

impl GroupNames {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Names as a JSON array literal, e.g. `["Kitchen","Bedroom"]`.
    pub fn array_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }
}

impl From<Vec<String>> for GroupNames {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl fmt::Display for GroupNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in &self.0 {
            writeln!(f, "{name}")?;
        }
        Ok(())
    }
}

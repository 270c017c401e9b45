pub mod collaborators;
pub mod command;
pub mod errors;
pub mod group;
pub mod message;

pub use collaborators::{Messenger, Translator};
pub use command::{Command, UpdateCommand};
pub use errors::RelayError;
pub use group::{Group, GroupNames, Groups, MAX_BRIGHTNESS};
pub use message::{ControlMessage, MessageKind, TypedMessage};

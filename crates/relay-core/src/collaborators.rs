use async_trait::async_trait;

use crate::errors::RelayError;

/// Turns free text into the JSON command shapes understood by
/// [`Command::parse`](crate::command::Command::parse).
#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(&self, system_prompt: &str, user_text: &str) -> Result<String, RelayError>;
}

/// Delivers an SMS.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, to: &str, from: &str, body: &str) -> Result<(), RelayError>;
}

//! Deterministic collaborators for exercising the relay without network calls.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use relay_core::{Messenger, RelayError, Translator};

/// Translator that replays pre-programmed completions in order.
pub struct ScriptedTranslator {
    responses: Mutex<VecDeque<Result<String, RelayError>>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedTranslator {
    pub fn new(responses: Vec<Result<String, RelayError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a translator that answers every call in `texts` order.
    pub fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok((*t).to_string())).collect())
    }

    /// Wait `delay` before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// `(system_prompt, user_text)` of every call so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Translator for ScriptedTranslator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn translate(&self, system_prompt: &str, user_text: &str) -> Result<String, RelayError> {
        self.calls
            .lock()
            .push((system_prompt.to_string(), user_text.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().pop_front();
        next.unwrap_or_else(|| Err(RelayError::upstream("ScriptedTranslator: no response configured")))
    }
}

/// One message handed to [`RecordingMessenger`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub from: String,
    pub body: String,
}

/// Messenger that records every message instead of sending it.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    fail_with: Option<RelayError>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A messenger whose sends are recorded but then fail with `error`.
    pub fn failing(error: RelayError) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(error),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.body.clone()).collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(&self, to: &str, from: &str, body: &str) -> Result<(), RelayError> {
        self.sent.lock().push(SentMessage {
            to: to.to_string(),
            from: from.to_string(),
            body: body.to_string(),
        });
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

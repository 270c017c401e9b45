//! Inbound SMS pipeline: authorize, translate, act on the control client,
//! reply.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use relay_core::{Command, Groups, Messenger, RelayError, Translator, TypedMessage, UpdateCommand};
use relay_upstream::system_prompt;

use crate::session::Session;

const NO_MATCHING_GROUPS: &str = "No matching groups found.";

/// How one inbound SMS was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmsOutcome {
    /// Sender is not the allow-listed user; nothing was sent back.
    Ignored,
    /// A reply (result or apology) was sent.
    Replied,
    /// The reply itself could not be delivered.
    ReplyFailed,
}

pub struct SmsRelay {
    session: Arc<Session>,
    translator: Arc<dyn Translator>,
    messenger: Arc<dyn Messenger>,
    user_number: String,
    service_number: String,
}

impl SmsRelay {
    pub fn new(
        session: Arc<Session>,
        translator: Arc<dyn Translator>,
        messenger: Arc<dyn Messenger>,
        user_number: impl Into<String>,
        service_number: impl Into<String>,
    ) -> Self {
        Self {
            session,
            translator,
            messenger,
            user_number: user_number.into(),
            service_number: service_number.into(),
        }
    }

    /// Handle one webhook delivery. Never fails: errors become an apology SMS.
    #[instrument(skip_all, fields(translator = self.translator.name()))]
    pub async fn handle(&self, from: &str, body: &str) -> SmsOutcome {
        if from != self.user_number {
            warn!(from = %from, "ignoring SMS from unauthorized sender");
            return SmsOutcome::Ignored;
        }

        let reply = match self.process(body).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, error_kind = e.error_kind(), "failed to process SMS");
                e.user_message().to_string()
            }
        };

        match self
            .messenger
            .send_message(&self.user_number, &self.service_number, &reply)
            .await
        {
            Ok(()) => SmsOutcome::Replied,
            Err(e) => {
                error!(error = %e, error_kind = e.error_kind(), "failed to send SMS reply");
                SmsOutcome::ReplyFailed
            }
        }
    }

    async fn process(&self, body: &str) -> Result<String, RelayError> {
        // Set only when this request had to fetch the snapshot itself.
        let mut fresh = None;
        let groups = match self.session.snapshot() {
            Some(groups) => groups,
            None => {
                let groups = self.session.refresh_groups(self.session.request_timeout()).await?;
                fresh = Some(Arc::clone(&groups));
                groups
            }
        };

        let prompt = system_prompt(&groups);
        let raw = self.translator.translate(&prompt, body).await?;

        match Command::parse(&raw)? {
            Command::Status { rooms } => self.status(&rooms, fresh).await,
            Command::Update(command) => self.update(&groups, command),
        }
    }

    /// Status lines for `rooms`, refreshing first unless `fresh` was just
    /// fetched for this request.
    async fn status(
        &self,
        rooms: &[String],
        fresh: Option<Arc<Groups>>,
    ) -> Result<String, RelayError> {
        let groups = match fresh {
            Some(groups) => groups,
            None => {
                self.session
                    .refresh_groups(self.session.request_timeout())
                    .await?
            }
        };
        let names = groups.resolve_names(rooms);
        let text = groups.format_status(names.as_slice());
        if text.is_empty() {
            return Ok(NO_MATCHING_GROUPS.to_string());
        }
        Ok(text)
    }

    fn update(&self, groups: &Groups, command: UpdateCommand) -> Result<String, RelayError> {
        let current = groups
            .find(&command.group)
            .ok_or_else(|| RelayError::protocol(format!("unknown group: {}", command.group)))?;

        let command = UpdateCommand {
            group: current.name.clone(),
            ..command
        }
        .with_default_brightness(Some(current));

        self.session.send(&TypedMessage::update(&command)?)?;
        info!(group = %command.group, is_on = command.is_on, brightness = ?command.brightness, "forwarded update");

        Ok(format!("Updated {}\n", command.expected_state().status_line()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use relay_core::{Group, MessageKind};
    use relay_upstream::{RecordingMessenger, ScriptedTranslator};

    const USER: &str = "+14155550100";
    const SERVICE: &str = "+14155550199";

    struct Harness {
        relay: SmsRelay,
        session: Arc<Session>,
        translator: Arc<ScriptedTranslator>,
        messenger: Arc<RecordingMessenger>,
    }

    fn harness(translator: ScriptedTranslator, messenger: RecordingMessenger) -> Harness {
        let session = Arc::new(Session::new(Duration::from_secs(5), 8));
        let translator = Arc::new(translator);
        let messenger = Arc::new(messenger);
        let relay = SmsRelay::new(
            Arc::clone(&session),
            Arc::clone(&translator) as Arc<dyn Translator>,
            Arc::clone(&messenger) as Arc<dyn Messenger>,
            USER,
            SERVICE,
        );
        Harness {
            relay,
            session,
            translator,
            messenger,
        }
    }

    fn house() -> Groups {
        Groups::new(vec![
            Group::new("Kitchen", true, 127),
            Group::new("Bedroom", false, 0),
        ])
        .unwrap()
    }

    /// Answers `status` with `groups` and records every message it receives.
    fn control_client(
        session: Arc<Session>,
        mut rx: mpsc::Receiver<String>,
        groups: Groups,
    ) -> tokio::task::JoinHandle<Vec<TypedMessage>> {
        tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(text) = rx.recv().await {
                let message = TypedMessage::from_json(&text).unwrap();
                if message.is(MessageKind::Status) {
                    session.dispatch(TypedMessage::group_state(&groups));
                }
                received.push(message);
            }
            received
        })
    }

    #[tokio::test]
    async fn unauthorized_sender_gets_no_reply() {
        let h = harness(ScriptedTranslator::replying(&[]), RecordingMessenger::new());
        assert_eq!(h.relay.handle("+19995550000", "lights on").await, SmsOutcome::Ignored);
        assert!(h.messenger.sent().is_empty());
        assert_eq!(h.translator.call_count(), 0);
    }

    #[tokio::test]
    async fn status_request_replies_with_formatted_groups() {
        let h = harness(
            ScriptedTranslator::replying(&[r#"{"type":"status","data":{"room":["Kitchen","Bedroom"]}}"#]),
            RecordingMessenger::new(),
        );
        let (_id, rx) = h.session.attach();
        let _client = control_client(Arc::clone(&h.session), rx, house());

        assert_eq!(h.relay.handle(USER, "how are the lights?").await, SmsOutcome::Replied);

        let sent = h.messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, USER);
        assert_eq!(sent[0].from, SERVICE);
        assert_eq!(sent[0].body, "Kitchen: On, Brightness: 50%\nBedroom: Off\n");

        let (prompt, text) = &h.translator.calls()[0];
        assert!(prompt.contains("Kitchen\nBedroom\n"));
        assert_eq!(text, "how are the lights?");
    }

    #[tokio::test]
    async fn cold_status_request_refreshes_once() {
        let h = harness(
            ScriptedTranslator::replying(&[r#"{"type":"status","data":{"room":["Kitchen"]}}"#]),
            RecordingMessenger::new(),
        );
        let (_id, rx) = h.session.attach();
        let client = control_client(Arc::clone(&h.session), rx, house());

        h.relay.handle(USER, "kitchen?").await;
        assert_eq!(h.messenger.bodies(), ["Kitchen: On, Brightness: 50%\n".to_string()]);

        let _ = h.session.attach();
        let received = client.await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].is(MessageKind::Status));
    }

    #[tokio::test]
    async fn warm_status_request_refreshes_before_answering() {
        let h = harness(
            ScriptedTranslator::replying(&[r#"{"type":"status","data":{"room":["Kitchen"]}}"#]),
            RecordingMessenger::new(),
        );
        h.session
            .install_snapshot(Groups::new(vec![Group::new("Kitchen", false, 0)]).unwrap());
        let (_id, rx) = h.session.attach();
        let client = control_client(Arc::clone(&h.session), rx, house());

        h.relay.handle(USER, "kitchen?").await;
        assert_eq!(h.messenger.bodies(), ["Kitchen: On, Brightness: 50%\n".to_string()]);

        let _ = h.session.attach();
        assert_eq!(client.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_for_all_and_unknown_rooms() {
        let h = harness(
            ScriptedTranslator::replying(&[
                "```json\n{\"type\":\"status\",\"data\":{\"room\":[\"all\"]}}\n```",
                r#"{"type":"status","data":{"room":["Garage"]}}"#,
            ]),
            RecordingMessenger::new(),
        );
        let (_id, rx) = h.session.attach();
        let _client = control_client(Arc::clone(&h.session), rx, house());

        h.relay.handle(USER, "everything?").await;
        h.relay.handle(USER, "garage?").await;
        assert_eq!(
            h.messenger.bodies(),
            [
                "Kitchen: On, Brightness: 50%\nBedroom: Off\n".to_string(),
                NO_MATCHING_GROUPS.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn update_without_brightness_is_forwarded_with_default() {
        let h = harness(
            ScriptedTranslator::replying(&[r#"{"type":"update","data":{"group":"kitchen","isOn":true}}"#]),
            RecordingMessenger::new(),
        );
        h.session.install_snapshot(house());
        let (_id, rx) = h.session.attach();
        let client = control_client(Arc::clone(&h.session), rx, house());

        assert_eq!(h.relay.handle(USER, "kitchen on").await, SmsOutcome::Replied);
        assert_eq!(h.messenger.bodies(), ["Updated Kitchen: On, Brightness: 50%\n".to_string()]);

        let _ = h.session.attach();
        let forwarded = client.await.unwrap();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].kind, "update");
        assert_eq!(
            forwarded[0].data,
            json!({"group": "Kitchen", "isOn": true, "brightness": 127})
        );
    }

    #[tokio::test]
    async fn update_for_dark_group_goes_full_brightness() {
        let h = harness(
            ScriptedTranslator::replying(&[r#"{"type":"update","data":{"group":"Bedroom","isOn":true}}"#]),
            RecordingMessenger::new(),
        );
        h.session.install_snapshot(house());
        let (_id, mut rx) = h.session.attach();

        h.relay.handle(USER, "bedroom on").await;
        let forwarded = TypedMessage::from_json(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(forwarded.data["brightness"], 254);
        assert_eq!(h.messenger.bodies(), ["Updated Bedroom: On, Brightness: 100%\n".to_string()]);
    }

    #[tokio::test]
    async fn update_for_unknown_group_apologizes() {
        let h = harness(
            ScriptedTranslator::replying(&[r#"{"type":"update","data":{"group":"Garage","isOn":false}}"#]),
            RecordingMessenger::new(),
        );
        h.session.install_snapshot(house());
        let (_id, mut rx) = h.session.attach();

        h.relay.handle(USER, "garage off").await;
        assert!(rx.try_recv().is_err());
        assert_eq!(
            h.messenger.bodies(),
            [RelayError::protocol("").user_message().to_string()]
        );
    }

    #[tokio::test]
    async fn offline_controller_apologizes() {
        let h = harness(ScriptedTranslator::replying(&[]), RecordingMessenger::new());
        assert_eq!(h.relay.handle(USER, "status").await, SmsOutcome::Replied);
        assert_eq!(
            h.messenger.bodies(),
            [RelayError::NotConnected.user_message().to_string()]
        );
        assert_eq!(h.translator.call_count(), 0);
    }

    #[tokio::test]
    async fn translator_garbage_apologizes() {
        let h = harness(ScriptedTranslator::replying(&["I'm not sure"]), RecordingMessenger::new());
        h.session.install_snapshot(house());
        h.relay.handle(USER, "??").await;
        let bodies = h.messenger.bodies();
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].starts_with("Sorry"));
    }

    #[tokio::test]
    async fn failed_reply_is_reported_not_raised() {
        let h = harness(
            ScriptedTranslator::new(vec![Err(RelayError::upstream("down"))]),
            RecordingMessenger::failing(RelayError::upstream("sms down")),
        );
        h.session.install_snapshot(house());
        assert_eq!(h.relay.handle(USER, "hi").await, SmsOutcome::ReplyFailed);
        assert_eq!(h.messenger.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_controller_times_out_with_apology() {
        let h = harness(
            ScriptedTranslator::replying(&[r#"{"type":"status","data":{"room":[]}}"#]),
            RecordingMessenger::new(),
        );
        h.session.install_snapshot(house());
        let (_id, _rx) = h.session.attach();

        h.relay.handle(USER, "status").await;
        let expected = RelayError::Timeout {
            kind: "group_state".into(),
            after: Duration::from_secs(5),
        };
        assert_eq!(h.messenger.bodies(), [expected.user_message().to_string()]);
        assert!(!h.session.has_pending("group_state"));
    }
}

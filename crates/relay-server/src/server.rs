use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use relay_core::{Messenger, Translator};

use crate::config::ServerConfig;
use crate::session::Session;
use crate::sms::SmsRelay;
use crate::websocket;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub sms: Arc<SmsRelay>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        translator: Arc<dyn Translator>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let session = Arc::new(Session::new(config.request_timeout, config.max_send_queue));
        let sms = Arc::new(SmsRelay::new(
            Arc::clone(&session),
            translator,
            messenger,
            config.user_phone_number.clone(),
            config.service_phone_number.clone(),
        ));
        Self {
            session,
            sms,
            config: Arc::new(config),
        }
    }
}

/// Form fields posted by the SMS provider webhook.
#[derive(Debug, Deserialize)]
struct InboundSms {
    #[serde(rename = "From", default)]
    from: String,
    #[serde(rename = "Body", default)]
    body: String,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket::ws_handler))
        .route("/text", post(text_handler))
        .route("/v1/healthcheck", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener and serve until [`ServerHandle::shutdown`].
pub async fn start(
    config: ServerConfig,
    translator: Arc<dyn Translator>,
    messenger: Arc<dyn Messenger>,
) -> Result<ServerHandle, std::io::Error> {
    let addr = config.bind_addr();
    let env = config.env;
    let state = AppState::new(config, translator, messenger);
    let session = Arc::clone(&state.session);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let token = CancellationToken::new();
    let serve_token = token.clone();
    let router = build_router(state);
    let server = tokio::spawn(async move {
        let shutdown = async move { serve_token.cancelled().await };
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            warn!(error = %e, "server exited with error");
        }
    });

    info!(addr = %local_addr, env = %env, "relay server started");

    Ok(ServerHandle {
        port: local_addr.port(),
        session,
        token,
        server,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub port: u16,
    session: Arc<Session>,
    token: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Stop accepting requests and close the control connection.
    pub fn shutdown(&self) {
        self.token.cancel();
        self.session.close();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait up to `timeout` for the server task to finish.
    pub async fn wait(self, timeout: Duration) {
        if tokio::time::timeout(timeout, self.server).await.is_err() {
            warn!("shutdown timed out after {timeout:?}");
        } else {
            info!("relay server stopped");
        }
    }
}

/// SMS webhook. Always 200 once the form parses; the outcome goes back by SMS.
async fn text_handler(
    State(state): State<AppState>,
    form: Result<Form<InboundSms>, FormRejection>,
) -> StatusCode {
    let Form(sms) = match form {
        Ok(form) => form,
        Err(rejection) => {
            warn!(error = %rejection, "rejecting unparseable webhook");
            return StatusCode::BAD_REQUEST;
        }
    };
    let outcome = state.sms.handle(&sms.from, &sms.body).await;
    debug!(?outcome, "webhook handled");
    StatusCode::OK
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "available",
        "systemInfo": {
            "environment": state.config.env.as_str(),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "controlClientConnected": state.session.is_connected(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use relay_core::{Group, Groups, MessageKind, TypedMessage};
    use relay_upstream::{RecordingMessenger, ScriptedTranslator};
    use tokio_tungstenite::tungstenite::Message;

    const USER: &str = "+14155550100";
    const SERVICE: &str = "+14155550199";

    fn config() -> ServerConfig {
        ServerConfig {
            user_phone_number: USER.into(),
            service_phone_number: SERVICE.into(),
            ..Default::default()
        }
    }

    async fn start_with(
        translator: ScriptedTranslator,
    ) -> (ServerHandle, Arc<RecordingMessenger>) {
        let messenger = Arc::new(RecordingMessenger::new());
        let handle = start(
            config(),
            Arc::new(translator),
            Arc::clone(&messenger) as Arc<dyn Messenger>,
        )
        .await
        .unwrap();
        (handle, messenger)
    }

    async fn wait_connected(handle: &ServerHandle) {
        for _ in 0..100 {
            if handle.session().is_connected() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("control client never attached");
    }

    /// Connects as the control client, answers every `status` with `groups`
    /// and returns every other message it receives.
    async fn spawn_control_client(
        handle: &ServerHandle,
        groups: Groups,
    ) -> tokio::task::JoinHandle<Vec<TypedMessage>> {
        let url = format!("ws://127.0.0.1:{}/ws", handle.port);
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (mut tx, mut rx) = ws.split();
        let task = tokio::spawn(async move {
            let mut others = Vec::new();
            while let Some(Ok(frame)) = rx.next().await {
                let Message::Text(text) = frame else {
                    continue;
                };
                let message = TypedMessage::from_json(text.as_str()).unwrap();
                if message.is(MessageKind::Status) {
                    let reply = TypedMessage::group_state(&groups).to_json().unwrap();
                    tx.send(Message::Text(reply.into())).await.unwrap();
                } else {
                    others.push(message);
                }
            }
            others
        });
        wait_connected(handle).await;
        task
    }

    fn house() -> Groups {
        Groups::new(vec![
            Group::new("Kitchen", true, 127),
            Group::new("Bedroom", false, 0),
        ])
        .unwrap()
    }

    async fn post_sms(port: u16, from: &str, body: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/text"))
            .form(&[("From", from), ("Body", body)])
            .send()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn healthcheck_reports_environment_and_connection() {
        let (handle, _) = start_with(ScriptedTranslator::replying(&[])).await;
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/v1/healthcheck", handle.port);
        let body: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(body["status"], "available");
        assert_eq!(body["systemInfo"]["environment"], "development");
        assert_eq!(body["systemInfo"]["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["controlClientConnected"], false);

        let _client = spawn_control_client(&handle, house()).await;
        let body: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(body["controlClientConnected"], true);
    }

    #[tokio::test]
    async fn status_sms_round_trips_through_control_client() {
        let (handle, messenger) = start_with(ScriptedTranslator::replying(&[
            r#"{"type":"status","data":{"room":["Kitchen","Bedroom"]}}"#,
        ]))
        .await;
        let _client = spawn_control_client(&handle, house()).await;

        let resp = post_sms(handle.port, USER, "what's on?").await;
        assert_eq!(resp.status(), 200);
        assert!(resp.text().await.unwrap().is_empty());

        assert_eq!(
            messenger.bodies(),
            ["Kitchen: On, Brightness: 50%\nBedroom: Off\n".to_string()]
        );
        assert_eq!(handle.session().pending_len(), 0);
    }

    #[tokio::test]
    async fn update_sms_is_forwarded_with_brightness() {
        let (handle, messenger) = start_with(ScriptedTranslator::replying(&[
            r#"{"type":"update","data":{"group":"Kitchen","isOn":true}}"#,
        ]))
        .await;
        let client = spawn_control_client(&handle, house()).await;

        let resp = post_sms(handle.port, USER, "kitchen on").await;
        assert_eq!(resp.status(), 200);
        assert_eq!(messenger.bodies(), ["Updated Kitchen: On, Brightness: 50%\n".to_string()]);

        handle.shutdown();
        let forwarded = tokio::time::timeout(Duration::from_secs(5), client)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].kind, "update");
        assert_eq!(forwarded[0].data["brightness"], 127);
        handle.wait(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn unauthorized_sender_gets_200_and_no_reply() {
        let (handle, messenger) = start_with(ScriptedTranslator::replying(&[])).await;
        let resp = post_sms(handle.port, "+19995550000", "lights off").await;
        assert_eq!(resp.status(), 200);
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn offline_controller_gets_apology() {
        let (handle, messenger) = start_with(ScriptedTranslator::replying(&[])).await;
        let resp = post_sms(handle.port, USER, "status").await;
        assert_eq!(resp.status(), 200);
        let bodies = messenger.bodies();
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].contains("offline"));
    }

    #[tokio::test]
    async fn unparseable_webhook_is_400() {
        let (handle, messenger) = start_with(ScriptedTranslator::replying(&[])).await;
        let resp = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}/text", handle.port))
            .header("content-type", "application/json")
            .body(r#"{"From":"x"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn second_control_client_replaces_first() {
        let (handle, _) = start_with(ScriptedTranslator::replying(&[])).await;
        let first = spawn_control_client(&handle, house()).await;
        let first_id = handle.session().connection_id().unwrap();

        let url = format!("ws://127.0.0.1:{}/ws", handle.port);
        let (_second, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        for _ in 0..100 {
            if handle.session().connection_id().is_some_and(|id| id != first_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_ne!(handle.session().connection_id(), Some(first_id));

        // The replaced socket is closed by the server.
        let leftover = tokio::time::timeout(Duration::from_secs(5), first)
            .await
            .unwrap()
            .unwrap();
        assert!(leftover.is_empty());
        assert!(handle.session().is_connected());
    }

    #[tokio::test]
    async fn shutdown_stops_server() {
        let (handle, _) = start_with(ScriptedTranslator::replying(&[])).await;
        let port = handle.port;
        handle.shutdown();
        assert!(handle.is_shutting_down());
        handle.wait(Duration::from_secs(5)).await;
        assert!(reqwest::get(format!("http://127.0.0.1:{port}/v1/healthcheck"))
            .await
            .is_err());
    }
}

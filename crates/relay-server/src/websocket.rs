//! Control-client websocket: one writer task per socket plus an in-order
//! receive loop feeding the session dispatcher.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use relay_core::TypedMessage;

use crate::server::AppState;
use crate::session::{ConnectionId, Dispatch, Session};

/// Why a receive loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopEnd {
    Closed,
    StreamEnded,
    ReadError(String),
}

/// `GET /ws` upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let heartbeat = state.config.heartbeat_interval;
    let session = Arc::clone(&state.session);
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_control_socket(socket, session, heartbeat))
}

/// Run one control connection until either side hangs up.
pub async fn handle_control_socket(socket: WebSocket, session: Arc<Session>, heartbeat: Duration) {
    let (connection_id, rx) = session.attach();
    let (ws_tx, ws_rx) = socket.split();

    let mut writer = tokio::spawn(write_loop(ws_tx, rx, heartbeat, connection_id.clone()));

    let reader_session = Arc::clone(&session);
    let reader = receive_loop(ws_rx, move |message| reader_session.dispatch(message));

    tokio::select! {
        end = reader => {
            info!(connection_id = %connection_id, reason = ?end, "control client receive loop ended");
        }
        _ = &mut writer => {
            debug!(connection_id = %connection_id, "control client writer ended");
        }
    }
    writer.abort();

    let _ = session.detach(&connection_id);
}

/// Forward queued outbound messages to the socket, pinging every `heartbeat`.
///
/// Ends when the queue closes (connection replaced or session closed) or the
/// socket rejects a write.
async fn write_loop<S>(
    mut ws_tx: S,
    mut rx: mpsc::Receiver<String>,
    heartbeat: Duration,
    connection_id: ConnectionId,
) where
    S: futures::Sink<WsMessage> + Unpin,
{
    let mut ping_interval = tokio::time::interval(heartbeat);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(text) => {
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            _ = ping_interval.tick() => {
                if ws_tx.send(WsMessage::Ping(Default::default())).await.is_err() {
                    break;
                }
                trace!(connection_id = %connection_id, "sent ping");
            }
        }
    }
}

/// Decode text frames and hand them to `on_message` in arrival order.
///
/// Malformed frames are logged and skipped; only a close frame, the end of
/// the stream or a read error stops the loop.
pub async fn receive_loop<S, F>(mut frames: S, mut on_message: F) -> LoopEnd
where
    S: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
    F: FnMut(TypedMessage) -> Dispatch,
{
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match TypedMessage::from_json(text.as_str()) {
                Ok(message) => {
                    let kind = message.kind.clone();
                    let outcome = on_message(message);
                    trace!(kind = %kind, ?outcome, "dispatched control message");
                }
                Err(e) => {
                    warn!(error = %e, error_kind = e.error_kind(), "dropping malformed control message");
                }
            },
            Ok(WsMessage::Binary(bytes)) => {
                warn!(len = bytes.len(), error_kind = "protocol_error", "dropping binary control frame");
            }
            Ok(WsMessage::Close(_)) => return LoopEnd::Closed,
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => {}
            Err(e) => return LoopEnd::ReadError(e.to_string()),
        }
    }
    LoopEnd::StreamEnded
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    fn text(value: serde_json::Value) -> Result<WsMessage, axum::Error> {
        Ok(WsMessage::Text(value.to_string().into()))
    }

    #[tokio::test]
    async fn dispatches_text_frames_in_order() {
        let frames = stream::iter(vec![
            text(json!({"type": "group_state", "data": {"groups": []}})),
            text(json!({"type": "light_added", "data": {"id": 1}})),
            text(json!({"type": "group_state", "data": {"groups": [{"name": "A", "isOn": false, "brightness": 0}]}})),
        ]);
        let mut seen = Vec::new();
        let end = receive_loop(frames, |m| {
            seen.push(m.kind);
            Dispatch::Dropped
        })
        .await;
        assert_eq!(end, LoopEnd::StreamEnded);
        assert_eq!(seen, ["group_state", "light_added", "group_state"]);
    }

    #[tokio::test]
    async fn malformed_and_binary_frames_are_skipped() {
        let frames = stream::iter(vec![
            Ok(WsMessage::Text("not json".into())),
            Ok(WsMessage::Binary(vec![1u8, 2, 3].into())),
            Ok(WsMessage::Ping(Default::default())),
            text(json!({"type": "status", "data": null})),
        ]);
        let mut count = 0;
        receive_loop(frames, |_| {
            count += 1;
            Dispatch::Dropped
        })
        .await;
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn close_frame_stops_loop() {
        let frames = stream::iter(vec![
            Ok(WsMessage::Close(None)),
            text(json!({"type": "status", "data": null})),
        ]);
        let mut count = 0;
        let end = receive_loop(frames, |_| {
            count += 1;
            Dispatch::Dropped
        })
        .await;
        assert_eq!(end, LoopEnd::Closed);
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn read_error_stops_loop() {
        let frames = stream::iter(vec![Err(axum::Error::new(std::io::Error::other("reset")))]);
        let end = receive_loop(frames, |_| Dispatch::Dropped).await;
        assert!(matches!(end, LoopEnd::ReadError(e) if e.contains("reset")));
    }

    #[tokio::test]
    async fn frames_reach_session_snapshot() {
        let session = Session::new(Duration::from_secs(5), 8);
        let frames = stream::iter(vec![text(json!({
            "type": "group_state",
            "data": {"groups": [{"name": "Kitchen", "isOn": true, "brightness": 127}]}
        }))]);
        receive_loop(frames, |m| session.dispatch(m)).await;
        assert_eq!(session.group_names().as_slice(), ["Kitchen"]);
    }

    #[tokio::test(start_paused = true)]
    async fn writer_forwards_queue_and_pings() {
        let (sink_tx, mut sink_rx) = futures::channel::mpsc::unbounded::<WsMessage>();
        let (tx, rx) = mpsc::channel(4);
        let writer = tokio::spawn(write_loop(
            sink_tx,
            rx,
            Duration::from_secs(30),
            ConnectionId::new(),
        ));

        tx.send("hello".into()).await.unwrap();
        assert!(matches!(sink_rx.next().await, Some(WsMessage::Text(t)) if t.as_str() == "hello"));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(matches!(sink_rx.next().await, Some(WsMessage::Ping(_))));

        drop(tx);
        assert!(matches!(sink_rx.next().await, Some(WsMessage::Close(None))));
        writer.await.unwrap();
    }
}

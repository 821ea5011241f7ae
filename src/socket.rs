//! The socket multiplexer: single read loop, serialized writer, per-frame
//! dispatch into the three fan-out sinks.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

use crate::client::ConnectionCore;
use crate::dial::WsStream;
use crate::error::{ClientError, MDPParseError, SocketError, TimeoutError};
use crate::heartbeat::Heartbeat;
use crate::state::ConnectionState;
use crate::wire::{MessageDataPayload, ServerMessage};

/// Guards the single WebSocket write half. A write failure is returned to
/// the caller and published on the errors sink but does not itself change
/// connection state — the read loop is trusted to observe any resulting
/// disconnect (see spec design notes on write-failure recovery).
pub(crate) struct Writer {
    sink: tokio::sync::Mutex<Option<SplitSink<WsStream, Message>>>,
}

impl Writer {
    pub(crate) fn new() -> Self {
        Self {
            sink: tokio::sync::Mutex::new(None),
        }
    }

    pub(crate) async fn install(&self, sink: SplitSink<WsStream, Message>) {
        *self.sink.lock().await = Some(sink);
    }

    pub(crate) async fn write_text(&self, text: String) -> Result<(), SocketError> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => sink
                .send(Message::Text(text.into()))
                .await
                .map_err(|e| SocketError::new("Unable to write message to socket hub", e)),
            None => Err(SocketError::without_cause(
                "Unable to write message to socket hub: no socket installed",
            )),
        }
    }

    /// Reply to a WS-level ping with the matching pong. Best-effort: a
    /// failure here is left for the read loop to observe as a disconnect,
    /// same as any other write.
    pub(crate) async fn write_pong(&self, pong: Message) {
        let mut guard = self.sink.lock().await;
        if let Some(sink) = guard.as_mut() {
            let _ = sink.send(pong).await;
        }
    }
}

/// Outcome of one pass through the read loop.
pub(crate) enum ReadOutcome {
    /// Non-fatal: keep looping.
    Continue,
    /// Fatal: caller must return to the driver.
    Fatal,
}

/// Run the read loop until the socket read fails fatally. Owns `read`
/// exclusively — no other task may read from this half of the socket.
pub(crate) async fn run_read_loop(
    mut read: futures_util::stream::SplitStream<WsStream>,
    keep_alive_timeout: Duration,
    core: Arc<ConnectionCore>,
) {
    loop {
        let frame = match tokio::time::timeout(keep_alive_timeout, read.next()).await {
            Err(_elapsed) => match handle_read_error(&core, ReadError::Timeout).await {
                ReadOutcome::Continue => continue,
                ReadOutcome::Fatal => return,
            },
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => {
                match handle_read_error(&core, ReadError::Network).await {
                    ReadOutcome::Continue => continue,
                    ReadOutcome::Fatal => return,
                }
            }
            Ok(Some(Ok(Message::Ping(data)))) => {
                core.writer.write_pong(Message::Pong(data)).await;
                continue;
            }
            Ok(Some(Ok(Message::Pong(_) | Message::Binary(_) | Message::Frame(_)))) => continue,
            Ok(Some(Ok(Message::Text(text)))) => {
                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(msg) => msg,
                    Err(e) => match handle_read_error(&core, ReadError::Parse(e)).await {
                        ReadOutcome::Continue => continue,
                        ReadOutcome::Fatal => return,
                    },
                }
            }
        };

        let core = Arc::clone(&core);
        tokio::spawn(async move {
            dispatch_frame(&core, frame).await;
        });
    }
}

enum ReadError {
    Parse(serde_json::Error),
    Timeout,
    Network,
}

/// Classify a failed read. Body-parse errors are non-fatal (reported and
/// skipped); timeout and network errors are fatal and push the connection
/// to `Disconnected`.
async fn handle_read_error(core: &Arc<ConnectionCore>, err: ReadError) -> ReadOutcome {
    match err {
        ReadError::Parse(e) => {
            core.emit_error(ClientError::Socket(SocketError::new(
                "Unable to decode server frame",
                e,
            )));
            ReadOutcome::Continue
        }
        ReadError::Timeout => {
            core.emit_error(ClientError::Timeout(TimeoutError(
                "Keepalive timeout reached: no frame received within the negotiated interval"
                    .to_owned(),
            )));
            core.state.set(ConnectionState::Disconnected);
            core.emit_error(ClientError::Socket(SocketError::without_cause(
                "socket disconnected",
            )));
            ReadOutcome::Fatal
        }
        ReadError::Network => {
            core.emit_error(ClientError::Socket(SocketError::without_cause(
                "socket read failed",
            )));
            core.state.set(ConnectionState::Disconnected);
            ReadOutcome::Fatal
        }
    }
}

/// Demultiplex one decoded frame into the correlator, messages sink, and
/// heartbeats sink.
///
/// A hub-set error (`E`) on a frame that also carries an identifier must
/// still reach `Correlator::try_resolve` first — a reply to an outstanding
/// call that denies the call (spec.md S4) resolves that call with
/// `CallHubError`, it does not just vanish as a sink-only `HubMessageError`.
/// Only once a frame failed to correlate to any pending call does a
/// non-empty `E` become a terminal, sink-only error.
async fn dispatch_frame(core: &Arc<ConnectionCore>, msg: ServerMessage) {
    if msg.has_identifier() {
        let identifier = msg.identifier.clone().unwrap_or_default();
        // Tracked cursor is the echoed `I`, not `C` — see the spec's design
        // notes on cursor source of truth: likely a bug relative to the
        // protocol's intent, preserved deliberately rather than "corrected".
        *core.cursor.write().expect("cursor lock poisoned") = Some(identifier.clone());

        if core.correlator.try_resolve(&identifier, msg.clone()).await {
            return;
        }

        if msg.has_error() {
            core.emit_error(ClientError::HubMessage(crate::error::HubMessageError(
                msg.error.clone().unwrap_or_default(),
            )));
            return;
        }

        if msg.has_data() {
            for raw in &msg.data {
                match serde_json::from_str::<MessageDataPayload>(raw.get()) {
                    Ok(payload) => {
                        let _ = core.message_tx.send(payload);
                        let _ = core
                            .heartbeat_tx
                            .send(Heartbeat::Normal("refreshed by subscription signal".to_owned()));
                    }
                    Err(e) => {
                        debug!(identifier = %identifier, error = %e, "subscription payload parse failure");
                        core.emit_error(ClientError::MDPParse(MDPParseError::new(
                            "Unable to unmarshal message data",
                            e,
                        )));
                    }
                }
            }
        } else {
            warn!(identifier = %identifier, "identified frame matched no pending call and carried no data");
            let _ = core.heartbeat_tx.send(Heartbeat::Awkward {
                identifier: identifier.clone(),
                frame_dump: format!("{msg:?}"),
            });
        }
    } else if msg.has_error() {
        core.emit_error(ClientError::HubMessage(crate::error::HubMessageError(
            msg.error.clone().unwrap_or_default(),
        )));
    } else {
        let _ = core
            .heartbeat_tx
            .send(Heartbeat::Normal("Default Heartbeat".to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ConnectionCore;
    use crate::state::ConnectionState;
    use tokio::net::TcpListener;

    async fn connect_loopback_pair() -> (WsStream, WsStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio_tungstenite::accept_async(stream).await.unwrap()
        });
        let (client, _resp) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        let server = server_task.await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn identified_frame_with_no_pending_call_publishes_subscription_event() {
        let (client_ws, mut server_ws) = connect_loopback_pair().await;
        let (write, read) = client_ws.split();
        let core = Arc::new(ConnectionCore::new_for_test());
        core.writer_for_test().install(write).await;

        let mut messages = core.message_rx.lock().await.take().unwrap();
        let mut heartbeats = core.heartbeat_rx.lock().await.take().unwrap();

        let loop_handle = tokio::spawn(run_read_loop(read, Duration::from_secs(5), Arc::clone(&core)));

        server_ws
            .send(Message::Text(
                r#"{"C":"d-abc,2","I":"7","M":[{"H":"c2","M":"u","A":[]}]}"#.into(),
            ))
            .await
            .unwrap();

        let event = messages.recv().await.unwrap();
        assert_eq!(event.hub_name, "c2");
        assert_eq!(event.method, "u");
        // Cursor is tracked from the echoed `I` ("7"), not `C` ("d-abc,2") —
        // see dispatch_frame's comment on cursor source of truth.
        assert_eq!(core.cursor.read().unwrap().as_deref(), Some("7"));
        let _ = heartbeats;
        drop(server_ws);
        let _ = loop_handle.await;
    }

    #[tokio::test]
    async fn frame_with_only_cursor_round_trips_into_cursor_state() {
        let (client_ws, mut server_ws) = connect_loopback_pair().await;
        let (write, read) = client_ws.split();
        let core = Arc::new(ConnectionCore::new_for_test());
        core.writer_for_test().install(write).await;
        let mut heartbeats = core.heartbeat_rx.lock().await.take().unwrap();

        let loop_handle = tokio::spawn(run_read_loop(read, Duration::from_secs(5), Arc::clone(&core)));

        server_ws
            .send(Message::Text(r#"{"C":"d-abc,1|a,1"}"#.into()))
            .await
            .unwrap();

        // No identifier: just a default heartbeat, cursor state untouched by
        // the identifier-only branch (spec S2: "cursor state is unchanged").
        let hb = heartbeats.recv().await.unwrap();
        assert!(matches!(hb, Heartbeat::Normal(reason) if reason == "Default Heartbeat"));
        assert!(core.cursor.read().unwrap().is_none());

        drop(server_ws);
        let _ = loop_handle.await;
    }

    #[tokio::test]
    async fn keepalive_timeout_emits_timeout_error_and_disconnects() {
        let (client_ws, _server_ws) = connect_loopback_pair().await;
        let (write, read) = client_ws.split();
        let core = Arc::new(ConnectionCore::new_for_test());
        core.writer_for_test().install(write).await;
        core.state.set(ConnectionState::Connected);
        let mut errors = core.error_rx.lock().await.take().unwrap();

        run_read_loop(read, Duration::from_millis(20), Arc::clone(&core)).await;

        let first = errors.recv().await.unwrap();
        assert!(matches!(first, ClientError::Timeout(_)));
        assert_eq!(core.state.get(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn ws_level_ping_gets_a_pong_reply() {
        let (client_ws, mut server_ws) = connect_loopback_pair().await;
        let (write, read) = client_ws.split();
        let core = Arc::new(ConnectionCore::new_for_test());
        core.writer_for_test().install(write).await;

        let loop_handle = tokio::spawn(run_read_loop(read, Duration::from_secs(5), Arc::clone(&core)));

        server_ws
            .send(Message::Ping(vec![1, 2, 3].into()))
            .await
            .unwrap();

        let reply = server_ws.next().await.unwrap().unwrap();
        match reply {
            Message::Pong(data) => assert_eq!(data.as_ref(), &[1u8, 2, 3][..]),
            other => panic!("expected Pong, got {other:?}"),
        }

        drop(server_ws);
        let _ = loop_handle.await;
    }

    /// S4, driven through the real dispatch path (not `Correlator::try_resolve`
    /// called directly): a hub reply to an outstanding call that also sets
    /// `E` must resolve the pending call with `CallHubError`, not vanish as
    /// a sink-only `HubMessageError` while the call hangs forever.
    #[tokio::test]
    async fn hub_error_reply_resolves_pending_call_through_the_real_read_loop() {
        let (client_ws, mut server_ws) = connect_loopback_pair().await;
        let (write, read) = client_ws.split();
        let core = Arc::new(ConnectionCore::new_for_test());
        core.writer_for_test().install(write).await;

        let loop_handle = tokio::spawn(run_read_loop(read, Duration::from_secs(5), Arc::clone(&core)));

        let payload = crate::wire::CallHubPayload::new("c2", "Deny", vec![]);
        let call = core
            .correlator
            .call_hub::<String>(payload, &core.writer, &core.error_tx);

        let respond = async {
            let request = server_ws.next().await.unwrap().unwrap();
            assert!(matches!(request, Message::Text(_)));
            server_ws
                .send(Message::Text(r#"{"I":"1","E":"denied"}"#.into()))
                .await
                .unwrap();
        };

        let (result, ()) = tokio::join!(call, respond);
        assert!(matches!(result, Err(ClientError::CallHub(_))));

        drop(server_ws);
        let _ = loop_handle.await;
    }
}

//! Call/response correlation: identifier allocation, the pending-call
//! registry, and the public hub-call operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use tokio::sync::{oneshot, Mutex};

use crate::error::{CallHubError, ClientError};
use crate::socket::Writer;
use crate::wire::{CallHubPayload, ServerMessage};

/// Identifier allocation and the pending-call registry. The allocator is a
/// plain atomic — per the spec's design notes, a globally serialized
/// counter needs no lock, just an atomic increment (spec §9).
pub(crate) struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, oneshot::Sender<ServerMessage>>>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn allocate_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Resolve a pending call by identifier, if one is registered. Removes
    /// and closes the entry. Returns `true` iff a pending call was found —
    /// the caller (the frame dispatcher) uses this to decide whether the
    /// frame's data should instead be treated as a subscription event.
    pub(crate) async fn try_resolve(&self, identifier: &str, msg: ServerMessage) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.remove(identifier) {
            Some(tx) => {
                let _ = tx.send(msg);
                true
            }
            None => false,
        }
    }

    /// Send a hub call and await its correlated reply, decoding `R` into
    /// `T`. Errors are both returned and published on `error_tx` (the
    /// sink's copy omits the wrapped cause — see `emit_and_return` below).
    pub(crate) async fn call_hub<T: DeserializeOwned>(
        &self,
        mut payload: CallHubPayload,
        writer: &Writer,
        error_tx: &tokio::sync::mpsc::Sender<ClientError>,
    ) -> Result<T, ClientError> {
        let id = self.allocate_id();
        payload.identifier = id.clone();

        let encoded = serde_json::to_string(&payload).map_err(|e| {
            emit_and_return(
                error_tx,
                CallHubError::new("Unable to marshal CallHubPayload", e),
            )
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if let Err(e) = writer.write_text(encoded).await {
            // The registry entry is left for dispatch or teardown to clean
            // up, per spec §4.5 step 4 — a write failure does not cancel
            // the pending rendezvous itself.
            return Err(ClientError::Socket(e));
        }

        match rx.await {
            Err(_) => Err(emit_and_return(
                error_tx,
                CallHubError::without_cause(format!(
                    "Call to method {} returned no result",
                    payload.method
                )),
            )),
            Ok(msg) => {
                if msg.has_error() {
                    Err(emit_and_return(
                        error_tx,
                        CallHubError::without_cause(msg.error.unwrap_or_default()),
                    ))
                } else {
                    let raw = msg
                        .result
                        .as_ref()
                        .map(|r| r.get())
                        .unwrap_or("null")
                        .to_owned();
                    serde_json::from_str(&raw).map_err(|e| {
                        emit_and_return(
                            error_tx,
                            CallHubError::new("Unable to parse response into result container", e),
                        )
                    })
                }
            }
        }
    }

    /// Convenience wrapper: a hub call with an empty hub/method/arguments
    /// and a `String` result container (spec §4.5).
    pub(crate) async fn send_ping(
        &self,
        writer: &Writer,
        error_tx: &tokio::sync::mpsc::Sender<ClientError>,
    ) -> Result<String, ClientError> {
        self.call_hub(CallHubPayload::new("", "", vec![]), writer, error_tx)
            .await
    }
}

/// Publish a text-only echo of `err` on the errors sink (dropping the
/// cause chain, which doesn't implement `Clone`) and return the full
/// error — satisfying the "both returned and published" propagation
/// policy without requiring the wrapped cause to be duplicated.
fn emit_and_return(error_tx: &tokio::sync::mpsc::Sender<ClientError>, err: CallHubError) -> ClientError {
    let echo = CallHubError::without_cause(err.to_string());
    let _ = error_tx.try_send(ClientError::CallHub(echo));
    ClientError::CallHub(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_strictly_increasing() {
        let correlator = Correlator::new();
        let first = correlator.allocate_id();
        let second = correlator.allocate_id();
        let third = correlator.allocate_id();
        assert_eq!(first, "1");
        assert_eq!(second, "2");
        assert_eq!(third, "3");
    }

    #[tokio::test]
    async fn try_resolve_removes_entry_after_matching() {
        let correlator = Correlator::new();
        let (tx, rx) = oneshot::channel();
        correlator.pending.lock().await.insert("5".to_owned(), tx);

        let msg = ServerMessage {
            cursor: None,
            data: vec![],
            result: None,
            identifier: Some("5".to_owned()),
            error: None,
        };
        assert!(correlator.try_resolve("5", msg).await);
        assert!(correlator.pending.lock().await.is_empty());
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn try_resolve_on_unknown_identifier_returns_false() {
        let correlator = Correlator::new();
        let msg = ServerMessage {
            cursor: None,
            data: vec![],
            result: None,
            identifier: Some("9".to_owned()),
            error: None,
        };
        assert!(!correlator.try_resolve("9", msg).await);
    }

    /// S1: a fake peer replies to the outbound call with a matching `I` and
    /// `R`; `call_hub` resolves with the decoded result and the registry
    /// entry is gone.
    #[tokio::test]
    async fn happy_call_resolves_with_decoded_result() {
        use futures_util::{SinkExt, StreamExt};
        use tokio::net::TcpListener;
        use tokio_tungstenite::tungstenite::protocol::Message;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let request = ws.next().await.unwrap().unwrap();
            assert!(matches!(request, Message::Text(_)));
            ws.send(Message::Text(r#"{"I":"1","R":"\"pong\""}"#.into()))
                .await
                .unwrap();
        });

        let (client_ws, _resp) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        let (write, mut read) = client_ws.split();

        let writer = Writer::new();
        writer.install(write).await;
        let correlator = Correlator::new();
        let (error_tx, _error_rx) = tokio::sync::mpsc::channel(5);

        let payload = CallHubPayload::new("c2", "Ping", vec![]);
        let call = correlator.call_hub::<String>(payload, &writer, &error_tx);

        let pump = async {
            if let Some(Ok(Message::Text(text))) = read.next().await {
                let msg: ServerMessage = serde_json::from_str(&text).unwrap();
                correlator
                    .try_resolve(msg.identifier.as_deref().unwrap(), msg)
                    .await;
            }
        };

        let (result, ()) = tokio::join!(call, pump);
        assert_eq!(result.unwrap(), "pong");
        assert!(correlator.pending.lock().await.is_empty());
        server.await.unwrap();
    }

    /// S4: the hub replies to call `"3"` with a non-empty `E`; `call_hub`
    /// returns `CallHubError` wrapping it, and the registry entry is
    /// removed.
    #[tokio::test]
    async fn hub_error_on_call_surfaces_as_call_hub_error() {
        use futures_util::{SinkExt, StreamExt};
        use tokio::net::TcpListener;
        use tokio_tungstenite::tungstenite::protocol::Message;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _request = ws.next().await.unwrap().unwrap();
            ws.send(Message::Text(r#"{"I":"1","E":"denied"}"#.into()))
                .await
                .unwrap();
        });

        let (client_ws, _resp) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        let (write, mut read) = client_ws.split();

        let writer = Writer::new();
        writer.install(write).await;
        let correlator = Correlator::new();
        let (error_tx, mut error_rx) = tokio::sync::mpsc::channel(5);

        let payload = CallHubPayload::new("c2", "Deny", vec![]);
        let call = correlator.call_hub::<String>(payload, &writer, &error_tx);

        let pump = async {
            if let Some(Ok(Message::Text(text))) = read.next().await {
                let msg: ServerMessage = serde_json::from_str(&text).unwrap();
                correlator
                    .try_resolve(msg.identifier.as_deref().unwrap(), msg)
                    .await;
            }
        };

        let (result, ()) = tokio::join!(call, pump);
        assert!(matches!(result, Err(ClientError::CallHub(_))));
        assert!(correlator.pending.lock().await.is_empty());
        assert!(error_rx.recv().await.is_some());
        server.await.unwrap();
    }
}

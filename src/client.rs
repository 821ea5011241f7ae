//! The public `Client`: construction, the connect/reconnect driver, the
//! hub-call entry point, and sink accessors.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::correlator::Correlator;
use crate::dial::{self, WsStream};
use crate::error::{ClientError, ConnectError, NegotiationError, SocketConnectionError};
use crate::heartbeat::Heartbeat;
use crate::negotiate::{self, NegotiationResponse};
use crate::socket::{self, Writer};
use crate::state::{ConnectionState, StateTracker};
use crate::wire::{CallHubPayload, MessageDataPayload};

const ERROR_SINK_CAPACITY: usize = 5;

/// Everything the read loop, dispatcher, and correlator share, independent
/// of the public `Client` handle. Kept behind an `Arc` so the driver task
/// and every short-lived dispatcher task can hold a reference.
pub(crate) struct ConnectionCore {
    pub(crate) state: StateTracker,
    pub(crate) cursor: RwLock<Option<String>>,
    pub(crate) correlator: Correlator,
    pub(crate) writer: Writer,
    pub(crate) error_tx: mpsc::Sender<ClientError>,
    pub(crate) error_rx: tokio::sync::Mutex<Option<mpsc::Receiver<ClientError>>>,
    pub(crate) message_tx: mpsc::UnboundedSender<MessageDataPayload>,
    pub(crate) message_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<MessageDataPayload>>>,
    pub(crate) heartbeat_tx: mpsc::UnboundedSender<Heartbeat>,
    pub(crate) heartbeat_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Heartbeat>>>,
}

impl ConnectionCore {
    fn new() -> Self {
        let (error_tx, error_rx) = mpsc::channel(ERROR_SINK_CAPACITY);
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (heartbeat_tx, heartbeat_rx) = mpsc::unbounded_channel();
        Self {
            state: StateTracker::new(ConnectionState::Ready),
            cursor: RwLock::new(None),
            correlator: Correlator::new(),
            writer: Writer::new(),
            error_tx,
            error_rx: tokio::sync::Mutex::new(Some(error_rx)),
            message_tx,
            message_rx: tokio::sync::Mutex::new(Some(message_rx)),
            heartbeat_tx,
            heartbeat_rx: tokio::sync::Mutex::new(Some(heartbeat_rx)),
        }
    }

    pub(crate) fn emit_error(&self, err: ClientError) {
        let _ = self.error_tx.try_send(err);
    }

    #[cfg(test)]
    pub(crate) fn new_for_test() -> Self {
        Self::new()
    }

    #[cfg(test)]
    pub(crate) fn writer_for_test(&self) -> &Writer {
        &self.writer
    }
}

/// A handle to one SignalR classic connection. Construction is pure; all
/// I/O happens in [`Client::connect`] and [`Client::call_hub`].
pub struct Client {
    config: Config,
    core: Arc<ConnectionCore>,
}

impl Client {
    /// Build a new, unconnected client. No I/O is performed.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            core: Arc::new(ConnectionCore::new()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state.get()
    }

    pub async fn subscribe_state(&self) -> Option<mpsc::Receiver<ConnectionState>> {
        self.core.state.subscribe().await
    }

    pub async fn listen_errors(&self) -> Option<mpsc::Receiver<ClientError>> {
        self.core.error_rx.lock().await.take()
    }

    pub async fn listen_hub_responses(&self) -> Option<mpsc::UnboundedReceiver<MessageDataPayload>> {
        self.core.message_rx.lock().await.take()
    }

    pub async fn listen_heartbeat(&self) -> Option<mpsc::UnboundedReceiver<Heartbeat>> {
        self.core.heartbeat_rx.lock().await.take()
    }

    /// Send a correlated call to the hub and await its reply, decoding the
    /// `R` field into `T`.
    pub async fn call_hub<T: DeserializeOwned>(&self, payload: CallHubPayload) -> Result<T, ClientError> {
        self.core
            .correlator
            .call_hub(payload, &self.core.writer, &self.core.error_tx)
            .await
    }

    /// A `CallHub` with an empty hub/method/arguments and a `String`
    /// result container (spec §4.5).
    pub async fn send_ping(&self) -> Result<String, ClientError> {
        self.core
            .correlator
            .send_ping(&self.core.writer, &self.core.error_tx)
            .await
    }

    /// Orchestrate the handshake and run the connection indefinitely,
    /// reconnecting on every non-terminal disconnect. Returns only once the
    /// client reaches `Broken` — either immediately (already broken), after
    /// a failed negotiate, or after a dial exhausts its retries.
    pub async fn connect(&self, hub_names: Vec<String>) -> Result<(), ClientError> {
        if self.core.state.get() == ConnectionState::Broken {
            let message = "Client in broken state. Check config or create new client instance.".to_owned();
            self.core.emit_error(ClientError::Connect(ConnectError(message.clone())));
            return Err(ClientError::Connect(ConnectError(message)));
        }
        self.core.state.set(ConnectionState::Connecting);

        let negotiation = self.negotiate_or_break().await?;
        let keep_alive = Duration::from_secs_f64(negotiation.keep_alive_timeout.max(0.0));

        let mut read = self.dial_connect(&negotiation, &hub_names).await?;

        loop {
            socket::run_read_loop(read, keep_alive, Arc::clone(&self.core)).await;

            if self.core.state.get() == ConnectionState::Broken {
                return Ok(());
            }
            self.core.state.set(ConnectionState::Reconnecting);

            read = self.dial_reconnect(&negotiation, &hub_names).await?;
        }
    }

    async fn negotiate_or_break(&self) -> Result<NegotiationResponse, ClientError> {
        match negotiate::negotiate(&self.config).await {
            Ok(n) => Ok(n),
            Err(e) => {
                self.core.state.set(ConnectionState::Broken);
                self.core
                    .emit_error(ClientError::Negotiation(NegotiationError::without_cause(
                        e.source.clone(),
                    )));
                Err(ClientError::Negotiation(e))
            }
        }
    }

    async fn dial_connect(
        &self,
        negotiation: &NegotiationResponse,
        hubs: &[String],
    ) -> Result<futures_util::stream::SplitStream<WsStream>, ClientError> {
        let url = dial::build_connect_url(
            &self.config,
            &negotiation.protocol_version,
            &negotiation.connection_token,
            hubs,
        );
        self.dial_and_install(&url, dial::CONNECT_HANDSHAKE_TIMEOUT).await
    }

    async fn dial_reconnect(
        &self,
        negotiation: &NegotiationResponse,
        hubs: &[String],
    ) -> Result<futures_util::stream::SplitStream<WsStream>, ClientError> {
        let cursor = self.core.cursor.read().expect("cursor lock poisoned").clone();
        let url = select_reconnect_url(&self.config, negotiation, hubs, cursor);
        self.dial_and_install(&url, dial::RECONNECT_HANDSHAKE_TIMEOUT).await
    }

    async fn dial_and_install(
        &self,
        url: &str,
        handshake_timeout: Duration,
    ) -> Result<futures_util::stream::SplitStream<WsStream>, ClientError> {
        use futures_util::StreamExt;

        let cookie_header = self.cookie_header_for();
        let core = Arc::clone(&self.core);
        let result = dial::dial_with_retry(
            url,
            &self.config.request_headers,
            cookie_header.as_deref(),
            handshake_timeout,
            |e| core.emit_error(ClientError::SocketConnection(SocketConnectionError(e.0))),
        )
        .await;

        match result {
            Ok(stream) => {
                self.core.state.set(ConnectionState::Connected);
                let (write, read) = stream.split();
                self.core.writer.install(write).await;
                Ok(read)
            }
            Err(e) => {
                self.core.state.set(ConnectionState::Broken);
                self.core
                    .emit_error(ClientError::SocketConnection(SocketConnectionError(e.0.clone())));
                Err(ClientError::SocketConnection(e))
            }
        }
    }

    /// Consult the configured cookie jar (if any) for the negotiated host's
    /// cookies and render them as a `Cookie` header value. Inert unless the
    /// caller opted into a jar via [`Config::cookie_jar`].
    fn cookie_header_for(&self) -> Option<String> {
        use reqwest::cookie::CookieStore;
        let jar = self.config.cookie_jar.as_ref()?;
        let origin = reqwest::Url::parse(&format!("https://{}/", self.config.host)).ok()?;
        jar.cookies(&origin)
            .and_then(|header_value| header_value.to_str().ok().map(str::to_owned))
    }
}

/// Pick the dial URL for a reconnect attempt: a non-empty cursor reconnects
/// with `messageId` set to it, but an absent or empty cursor degrades to a
/// fresh connect URL (boundary 9) rather than reconnecting with no cursor.
fn select_reconnect_url(
    config: &Config,
    negotiation: &NegotiationResponse,
    hubs: &[String],
    cursor: Option<String>,
) -> String {
    match cursor {
        Some(c) if !c.is_empty() => dial::build_reconnect_url(
            config,
            &negotiation.protocol_version,
            &negotiation.connection_token,
            hubs,
            &c,
        ),
        _ => dial::build_connect_url(config, &negotiation.protocol_version, &negotiation.connection_token, hubs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_negotiation() -> NegotiationResponse {
        NegotiationResponse {
            connection_token: "token-1".to_owned(),
            protocol_version: "1.5".to_owned(),
            keep_alive_timeout: 10.0,
            disconnect_timeout: 30.0,
            try_websockets: true,
        }
    }

    #[test]
    fn select_reconnect_url_with_no_cursor_degrades_to_connect_path() {
        let config = Config::new().host("example.org");
        let url = select_reconnect_url(&config, &test_negotiation(), &["c2".to_owned()], None);
        assert!(url.contains("/connect?"));
        assert!(!url.contains("/reconnect?"));
    }

    #[test]
    fn select_reconnect_url_with_empty_cursor_degrades_to_connect_path() {
        let config = Config::new().host("example.org");
        let url = select_reconnect_url(&config, &test_negotiation(), &["c2".to_owned()], Some(String::new()));
        assert!(url.contains("/connect?"));
        assert!(!url.contains("/reconnect?"));
    }

    #[test]
    fn select_reconnect_url_with_nonempty_cursor_uses_reconnect_path() {
        let config = Config::new().host("example.org");
        let url = select_reconnect_url(
            &config,
            &test_negotiation(),
            &["c2".to_owned()],
            Some("d-abc,1|C2,0".to_owned()),
        );
        assert!(url.contains("/reconnect?"));
        assert!(url.contains("messageId="));
    }

    #[tokio::test]
    async fn connect_on_broken_client_fails_without_modifying_state() {
        let client = Client::new(Config::new());
        client.core.state.set(ConnectionState::Broken);

        let result = client.connect(vec!["c2".to_owned()]).await;
        assert!(matches!(result, Err(ClientError::Connect(_))));
        assert_eq!(client.state(), ConnectionState::Broken);
    }

    #[test]
    fn new_client_starts_in_ready_state() {
        let client = Client::new(Config::new());
        assert_eq!(client.state(), ConnectionState::Ready);
    }
}

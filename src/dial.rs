//! WebSocket dial: URL construction, the retrying dial algorithm, and the
//! scheme-agnostic primitive tests drive directly with a `ws://` loopback
//! URL (production always builds a `wss://` one — see `build_connect_url`).

use std::collections::HashMap;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::Config;
use crate::error::SocketConnectionError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) const CONNECT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);
pub(crate) const RECONNECT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

fn unix_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis()
}

/// `connectionData` is the JSON encoding of `[{"Name": hub}, ...]`.
fn connection_data(hubs: &[String]) -> String {
    let entries: Vec<crate::wire::HubName<'_>> = hubs
        .iter()
        .map(|name| crate::wire::HubName { name })
        .collect();
    serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_owned())
}

/// Build the production `wss://` connect URL. `protocol_version` and
/// `connection_token` come from the negotiate response.
pub(crate) fn build_connect_url(
    config: &Config,
    protocol_version: &str,
    connection_token: &str,
    hubs: &[String],
) -> String {
    format!(
        "wss://{host}/{path}?transport=webSockets&clientProtocol={proto}&connectionToken={token}&connectionData={data}&_={millis}",
        host = config.host,
        path = config.connect_path,
        proto = urlencode(protocol_version),
        token = urlencode(connection_token),
        data = urlencode(&connection_data(hubs)),
        millis = unix_millis(),
    )
}

/// Build the production `wss://` reconnect URL, adding `messageId`. A
/// `None`/empty cursor must never reach this function — callers select
/// `build_connect_url` instead when the cursor is empty (boundary 9).
pub(crate) fn build_reconnect_url(
    config: &Config,
    protocol_version: &str,
    connection_token: &str,
    hubs: &[String],
    cursor: &str,
) -> String {
    format!(
        "wss://{host}/{path}?transport=webSockets&clientProtocol={proto}&connectionToken={token}&connectionData={data}&messageId={cursor}&_={millis}",
        host = config.host,
        path = config.reconnect_path,
        proto = urlencode(protocol_version),
        token = urlencode(connection_token),
        data = urlencode(&connection_data(hubs)),
        cursor = urlencode(cursor),
        millis = unix_millis(),
    )
}

/// Minimal percent-encoding for query values; headers/paths in this
/// protocol never contain characters outside the common safe set besides
/// what this covers (`connectionData` is JSON, connection tokens are
/// base64-ish). Avoids pulling in a URL-encoding crate for a handful of
/// characters.
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// A single dial attempt against `url` (any scheme `tokio-tungstenite`
/// accepts — `wss://` in production, `ws://` in loopback tests), attaching
/// caller headers and any cookie-jar cookies, bounded by
/// `handshake_timeout`.
pub(crate) async fn dial_once(
    url: &str,
    headers: &HashMap<String, Vec<String>>,
    cookie_header: Option<&str>,
    handshake_timeout: Duration,
) -> Result<WsStream, SocketConnectionError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| SocketConnectionError(format!("invalid URL '{url}': {e}")))?;

    for (name, values) in headers {
        for value in values {
            let header_value = value.parse().map_err(|e| {
                SocketConnectionError(format!("invalid header '{name}': {e:?}"))
            })?;
            request.headers_mut().append(
                name.parse::<tokio_tungstenite::tungstenite::http::HeaderName>()
                    .map_err(|e| SocketConnectionError(format!("invalid header name '{name}': {e}")))?,
                header_value,
            );
        }
    }

    if let Some(cookie) = cookie_header {
        if !cookie.is_empty() {
            request.headers_mut().insert(
                "Cookie",
                cookie
                    .parse()
                    .map_err(|e| SocketConnectionError(format!("invalid cookie header: {e:?}")))?,
            );
        }
    }

    match tokio::time::timeout(handshake_timeout, tokio_tungstenite::connect_async(request)).await
    {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(SocketConnectionError(format!(
            "Unable to dial successfully: {e}"
        ))),
        Err(_) => Err(SocketConnectionError(format!(
            "handshake did not complete within {handshake_timeout:?}"
        ))),
    }
}

/// The shared dial-with-retry algorithm (spec §4.2.1): attempt index 0
/// dials immediately; indices 1..4 sleep `2^i` seconds before dialing;
/// index 5 sleeps 32s and then gives up without dialing, for five real
/// dial attempts and 62s of cumulative delay before the terminal error.
///
/// `on_attempt_error` is invoked for every non-terminal failed attempt so
/// the driver can publish it on the `errors` sink without this function
/// knowing about sinks.
pub(crate) async fn dial_with_retry<F>(
    url: &str,
    headers: &HashMap<String, Vec<String>>,
    cookie_header: Option<&str>,
    handshake_timeout: Duration,
    mut on_attempt_error: F,
) -> Result<WsStream, SocketConnectionError>
where
    F: FnMut(SocketConnectionError),
{
    for i in 0..=5u32 {
        if i == 5 {
            tokio::time::sleep(Duration::from_secs(32)).await;
            return Err(SocketConnectionError(
                "MAX RETRIES REACHED. ABORTING CONNECTION.".to_owned(),
            ));
        }
        if i > 0 {
            tokio::time::sleep(Duration::from_secs(2u64.pow(i))).await;
        }
        match dial_once(url, headers, cookie_header, handshake_timeout).await {
            Ok(stream) => return Ok(stream),
            Err(e) => on_attempt_error(e),
        }
    }
    unreachable!("loop above always returns by index 5")
}

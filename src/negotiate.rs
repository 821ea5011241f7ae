//! HTTP negotiation: the first half of the two-phase handshake.

use serde::Deserialize;

use crate::config::Config;
use crate::error::NegotiationError;

/// Server-returned negotiation parameters. Only the fields the core
/// consumes are named explicitly; everything else in the body is ignored.
/// Treated as immutable once received.
#[derive(Debug, Clone, Deserialize)]
pub struct NegotiationResponse {
    #[serde(rename = "ConnectionToken")]
    pub connection_token: String,

    #[serde(rename = "ProtocolVersion")]
    pub protocol_version: String,

    #[serde(rename = "KeepAliveTimeout")]
    pub keep_alive_timeout: f64,

    #[serde(rename = "DisconnectTimeout", default)]
    pub disconnect_timeout: f64,

    #[serde(rename = "TryWebSockets", default)]
    pub try_websockets: bool,
}

fn unix_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis()
}

/// Issue the negotiate GET and parse the body. Any failure along the way
/// (request construction, transport, body read, JSON parse) is reported as
/// a single `NegotiationError` wrapping the underlying cause — the caller
/// is responsible for transitioning state to `Broken`.
pub async fn negotiate(config: &Config) -> Result<NegotiationResponse, NegotiationError> {
    let url = config.negotiate_url(unix_millis());

    let mut builder = config.http_client.get(&url);
    for (name, values) in &config.request_headers {
        for value in values {
            builder = builder.header(name, value);
        }
    }

    let response = builder
        .send()
        .await
        .map_err(|e| NegotiationError::new("Unable to execute negotiation request", e))?;

    let body = response
        .text()
        .await
        .map_err(|e| NegotiationError::new("Unable to read negotiation response body", e))?;

    serde_json::from_str(&body).map_err(|e| {
        NegotiationError::new(format!("Unable to parse negotiation response: {body}"), e)
    })
}

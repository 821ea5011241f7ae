//! Closed error taxonomy.
//!
//! Every variant wraps an optional cause and carries a `source` string
//! describing where it originated, matching the shape `forwarder::uplink`
//! uses for its own error type — plain enums with hand-written `Display`,
//! no `thiserror`.

use std::error::Error as StdError;
use std::fmt;

type Cause = Box<dyn StdError + Send + Sync>;

/// Caller attempted to connect a client already in the `Broken` state.
#[derive(Debug)]
pub struct ConnectError(pub String);

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectError: {}", self.0)
    }
}

impl StdError for ConnectError {}

/// HTTP negotiation failed (request construction, transport, body, parse).
#[derive(Debug)]
pub struct NegotiationError {
    pub source: String,
    pub cause: Option<Cause>,
}

impl NegotiationError {
    pub fn new(source: impl Into<String>, cause: impl Into<Cause>) -> Self {
        Self {
            source: source.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn without_cause(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            cause: None,
        }
    }
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "NegotiationError: {} ({})", self.source, cause),
            None => write!(f, "NegotiationError: {}", self.source),
        }
    }
}

impl StdError for NegotiationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn StdError + 'static))
    }
}

/// WebSocket dial attempt failed; also used for the exhausted-retries
/// terminal case.
#[derive(Debug)]
pub struct SocketConnectionError(pub String);

impl fmt::Display for SocketConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SocketConnectionError: {}", self.0)
    }
}

impl StdError for SocketConnectionError {}

/// Read/write failure on an established socket, including JSON-shape errors.
#[derive(Debug)]
pub struct SocketError {
    pub source: String,
    pub cause: Option<Cause>,
}

impl SocketError {
    pub fn new(source: impl Into<String>, cause: impl Into<Cause>) -> Self {
        Self {
            source: source.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn without_cause(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            cause: None,
        }
    }
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "SocketError: {} ({})", self.source, cause),
            None => write!(f, "SocketError: {}", self.source),
        }
    }
}

impl StdError for SocketError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn StdError + 'static))
    }
}

/// Keepalive deadline exceeded.
#[derive(Debug)]
pub struct TimeoutError(pub String);

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeoutError: {}", self.0)
    }
}

impl StdError for TimeoutError {}

/// The hub sent a frame with a non-empty `E` field.
#[derive(Debug)]
pub struct HubMessageError(pub String);

impl fmt::Display for HubMessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HubMessageError: {}", self.0)
    }
}

impl StdError for HubMessageError {}

/// A subscription payload (`MessageDataPayload`) could not be decoded.
#[derive(Debug)]
pub struct MDPParseError {
    pub source: String,
    pub cause: Option<Cause>,
}

impl MDPParseError {
    pub fn new(source: impl Into<String>, cause: impl Into<Cause>) -> Self {
        Self {
            source: source.into(),
            cause: Some(cause.into()),
        }
    }
}

impl fmt::Display for MDPParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "MDPParseError: {} ({})", self.source, cause),
            None => write!(f, "MDPParseError: {}", self.source),
        }
    }
}

impl StdError for MDPParseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn StdError + 'static))
    }
}

/// Failure in the request/response correlator: marshal, empty result, hub
/// error, or unmarshal.
#[derive(Debug)]
pub struct CallHubError {
    pub source: String,
    pub cause: Option<Cause>,
}

impl CallHubError {
    pub fn new(source: impl Into<String>, cause: impl Into<Cause>) -> Self {
        Self {
            source: source.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn without_cause(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            cause: None,
        }
    }
}

impl fmt::Display for CallHubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "CallHubError: {} ({})", self.source, cause),
            None => write!(f, "CallHubError: {}", self.source),
        }
    }
}

impl StdError for CallHubError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn StdError + 'static))
    }
}

/// The closed set of failures the client can produce, used on the `errors`
/// sink and as the source of truth for `Display`.
#[derive(Debug)]
pub enum ClientError {
    Connect(ConnectError),
    Negotiation(NegotiationError),
    SocketConnection(SocketConnectionError),
    Socket(SocketError),
    Timeout(TimeoutError),
    HubMessage(HubMessageError),
    MDPParse(MDPParseError),
    CallHub(CallHubError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connect(e) => e.fmt(f),
            ClientError::Negotiation(e) => e.fmt(f),
            ClientError::SocketConnection(e) => e.fmt(f),
            ClientError::Socket(e) => e.fmt(f),
            ClientError::Timeout(e) => e.fmt(f),
            ClientError::HubMessage(e) => e.fmt(f),
            ClientError::MDPParse(e) => e.fmt(f),
            ClientError::CallHub(e) => e.fmt(f),
        }
    }
}

impl StdError for ClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ClientError::Connect(e) => e.source(),
            ClientError::Negotiation(e) => e.source(),
            ClientError::SocketConnection(e) => e.source(),
            ClientError::Socket(e) => e.source(),
            ClientError::Timeout(e) => e.source(),
            ClientError::HubMessage(e) => e.source(),
            ClientError::MDPParse(e) => e.source(),
            ClientError::CallHub(e) => e.source(),
        }
    }
}

impl From<ConnectError> for ClientError {
    fn from(e: ConnectError) -> Self {
        ClientError::Connect(e)
    }
}
impl From<NegotiationError> for ClientError {
    fn from(e: NegotiationError) -> Self {
        ClientError::Negotiation(e)
    }
}
impl From<SocketConnectionError> for ClientError {
    fn from(e: SocketConnectionError) -> Self {
        ClientError::SocketConnection(e)
    }
}
impl From<SocketError> for ClientError {
    fn from(e: SocketError) -> Self {
        ClientError::Socket(e)
    }
}
impl From<TimeoutError> for ClientError {
    fn from(e: TimeoutError) -> Self {
        ClientError::Timeout(e)
    }
}
impl From<HubMessageError> for ClientError {
    fn from(e: HubMessageError) -> Self {
        ClientError::HubMessage(e)
    }
}
impl From<MDPParseError> for ClientError {
    fn from(e: MDPParseError) -> Self {
        ClientError::MDPParse(e)
    }
}
impl From<CallHubError> for ClientError {
    fn from(e: CallHubError) -> Self {
        ClientError::CallHub(e)
    }
}

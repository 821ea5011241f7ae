//! Wire-level message shapes, preserving the protocol's terse field letters.
//!
//! Argument and result payloads are forwarded opaquely via
//! [`serde_json::value::RawValue`] rather than parsed — the core does not
//! own application payload schemas (see the crate's non-goals).

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Frame received from the peer. Field names mirror the wire letters
/// exactly; `I` is the identifier echoed from a prior call, `C` the
/// resumption cursor, `M` subscription payloads, `R` a correlated call's
/// raw result, `E` a hub-set error string.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "C", default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,

    #[serde(rename = "M", default)]
    pub data: Vec<Box<RawValue>>,

    #[serde(rename = "R", default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<RawValue>>,

    #[serde(rename = "I", default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    #[serde(rename = "E", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerMessage {
    /// `true` when `E` is present and non-empty.
    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// `true` when `I` is present and non-empty.
    pub fn has_identifier(&self) -> bool {
        self.identifier.as_deref().is_some_and(|i| !i.is_empty())
    }

    /// `true` when `M` carries at least one element.
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }
}

/// A parsed subscription event: one element of an inbound frame's `M` list.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDataPayload {
    #[serde(rename = "H")]
    pub hub_name: String,

    #[serde(rename = "M")]
    pub method: String,

    #[serde(rename = "A", default)]
    pub arguments: Vec<Box<RawValue>>,
}

/// Caller-supplied hub call. `identifier` is assigned by the correlator —
/// callers never set it themselves, which is why it is not public outside
/// the crate.
#[derive(Debug, Clone, Serialize)]
pub struct CallHubPayload {
    #[serde(rename = "H")]
    pub hub: String,

    #[serde(rename = "M")]
    pub method: String,

    #[serde(rename = "A")]
    pub arguments: Vec<serde_json::Value>,

    #[serde(rename = "I")]
    pub(crate) identifier: String,
}

impl CallHubPayload {
    /// Build a new call with hub, method and arguments. The identifier is
    /// filled in by [`crate::correlator::Correlator::call_hub`]; the empty
    /// string here is a placeholder never written to the wire as-is.
    pub fn new(
        hub: impl Into<String>,
        method: impl Into<String>,
        arguments: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            hub: hub.into(),
            method: method.into(),
            arguments,
            identifier: String::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// A single entry of the `connectionData` query parameter: `[{"Name": hub}]`.
#[derive(Debug, Serialize)]
pub(crate) struct HubName<'a> {
    #[serde(rename = "Name")]
    pub name: &'a str,
}

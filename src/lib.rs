//! Client library for the SignalR 1.5 "classic" hub protocol over
//! WebSocket.
//!
//! Connects to a hub endpoint, multiplexes request/response calls onto a
//! single persistent socket, streams server-pushed subscription events
//! back to the caller, and maintains liveness across transient disconnects
//! via reconnection with a resumption cursor.
//!
//! Out of scope: long-polling/SSE transports, parsing of hub argument
//! payloads beyond opaque forwarding, automatic hub rejoin after a
//! terminal failure.

mod client;
pub mod config;
mod correlator;
mod dial;
pub mod error;
pub mod heartbeat;
mod negotiate;
mod socket;
mod state;
pub mod wire;

pub use client::Client;
pub use config::Config;
pub use error::ClientError;
pub use heartbeat::Heartbeat;
pub use negotiate::NegotiationResponse;
pub use state::ConnectionState;
pub use wire::{CallHubPayload, MessageDataPayload};

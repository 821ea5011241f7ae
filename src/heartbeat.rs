//! Liveness signals surfaced to the caller on the `heartbeats` sink.

/// A liveness signal. *Normal* carries a short reason and is emitted on
/// every identifierless frame and every successful subscription event.
/// *Awkward* carries a raw dump of an identified frame that matched no
/// pending call and carried no data — a protocol oddity in the peer, not
/// an error, per `original_source/heartbeat.go`'s `AwkwardHeartbeat`.
#[derive(Debug, Clone)]
pub enum Heartbeat {
    Normal(String),
    Awkward { identifier: String, frame_dump: String },
}

impl std::fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Heartbeat::Normal(reason) => write!(f, "Thump thump! - {reason}"),
            Heartbeat::Awkward { .. } => write!(f, "Thud thud!"),
        }
    }
}

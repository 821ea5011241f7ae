//! Connection lifecycle state: a total order with one terminal value.

use std::sync::RwLock;

use tokio::sync::mpsc;

/// Lifecycle state of a connection. Declaration order is the total order
/// the invariant checks rely on: `Ready < Connecting < Reconnecting <
/// Connected < Disconnected < Broken`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Ready,
    Connecting,
    Reconnecting,
    Connected,
    Disconnected,
    Broken,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Ready => "Ready",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Reconnecting => "Reconnecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Broken => "Broken",
        };
        f.write_str(s)
    }
}

/// Capacity of the `state` sink — see spec §3.
const STATE_SINK_CAPACITY: usize = 5;

/// Guards the current lifecycle state and fans transitions out to a
/// bounded, droppable sink. Mirrors `original_source/client.go`'s
/// `stateMutex`/`stateChan` pair, but reads take a shared lock directly
/// instead of going through a tracker goroutine — `set_state` callers here
/// already run in their own tasks.
pub struct StateTracker {
    state: RwLock<ConnectionState>,
    sink_tx: mpsc::Sender<ConnectionState>,
    sink_rx: tokio::sync::Mutex<Option<mpsc::Receiver<ConnectionState>>>,
}

impl StateTracker {
    pub fn new(initial: ConnectionState) -> Self {
        let (sink_tx, sink_rx) = mpsc::channel(STATE_SINK_CAPACITY);
        Self {
            state: RwLock::new(initial),
            sink_tx,
            sink_rx: tokio::sync::Mutex::new(Some(sink_rx)),
        }
    }

    /// Current state, readable concurrently.
    pub fn get(&self) -> ConnectionState {
        *self.state.read().expect("state lock poisoned")
    }

    /// Attempt an atomic transition. Silently rejected once `Broken` is
    /// reached. Accepted transitions are offered (non-blocking) to the
    /// `state` sink; a full sink drops the notification rather than block
    /// the driver.
    pub fn set(&self, next: ConnectionState) {
        {
            let mut guard = self.state.write().expect("state lock poisoned");
            if *guard == ConnectionState::Broken {
                return;
            }
            *guard = next;
        }
        let _ = self.sink_tx.try_send(next);
    }

    /// Take ownership of the `state` sink's receiving half. Can only be
    /// called once; subsequent calls return `None`.
    pub async fn subscribe(&self) -> Option<mpsc::Receiver<ConnectionState>> {
        self.sink_rx.lock().await.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order_matches_declared_sequence() {
        assert!(ConnectionState::Ready < ConnectionState::Connecting);
        assert!(ConnectionState::Connecting < ConnectionState::Reconnecting);
        assert!(ConnectionState::Reconnecting < ConnectionState::Connected);
        assert!(ConnectionState::Connected < ConnectionState::Disconnected);
        assert!(ConnectionState::Disconnected < ConnectionState::Broken);
    }

    #[test]
    fn broken_is_terminal() {
        let tracker = StateTracker::new(ConnectionState::Connected);
        tracker.set(ConnectionState::Broken);
        tracker.set(ConnectionState::Ready);
        assert_eq!(tracker.get(), ConnectionState::Broken);
    }

    #[tokio::test]
    async fn accepted_transitions_are_published_to_sink() {
        let tracker = StateTracker::new(ConnectionState::Ready);
        let mut rx = tracker.subscribe().await.unwrap();
        tracker.set(ConnectionState::Connecting);
        tracker.set(ConnectionState::Connected);
        assert_eq!(rx.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(rx.recv().await, Some(ConnectionState::Connected));
    }

    #[tokio::test]
    async fn subscribe_can_only_be_taken_once() {
        let tracker = StateTracker::new(ConnectionState::Ready);
        assert!(tracker.subscribe().await.is_some());
        assert!(tracker.subscribe().await.is_none());
    }
}

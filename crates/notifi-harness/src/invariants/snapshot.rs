//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the system at a point in time.
//! Invariants operate on snapshots rather than live state so every check in
//! one pass sees the same state.

use notifi_app::{App, Bridge};
use notifi_core::Environment;
use notifi_proto::MessageId;

/// Snapshot of every simulated client.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-client state snapshots.
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no clients).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot with a single client.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client] }
    }

    /// Create a snapshot from multiple clients.
    pub fn from_clients(clients: Vec<ClientSnapshot>) -> Self {
        Self { clients }
    }
}

/// Snapshot of one client's observable state.
#[derive(Debug, Clone, Default)]
pub struct ClientSnapshot {
    /// Device id of the client.
    pub device_id: String,
    /// Timeline ids in display order.
    pub message_ids: Vec<MessageId>,
    /// Unread counter.
    pub unread_count: u32,
    /// Viewport within the near-bottom threshold.
    pub is_near_bottom: bool,
    /// A history request is outstanding.
    pub fetch_in_flight: bool,
    /// Holds a bearer token.
    pub logged_in: bool,
    /// Connection indicator shown to the user.
    pub status_connected: bool,
    /// Connection state machine reports an open channel.
    pub bridge_connected: bool,
    /// Sockets the driver currently holds open or opening.
    pub open_channels: usize,
}

impl ClientSnapshot {
    /// Capture a client from its App, its Bridge and the driver's open
    /// channel count.
    pub fn capture<E: Environment>(
        app: &App<E::Instant>,
        bridge: &Bridge<E>,
        open_channels: usize,
    ) -> Self {
        let read_state = app.read_state();
        Self {
            device_id: bridge.identity().device_id().to_string(),
            message_ids: app.timeline().messages().iter().map(|m| m.id).collect(),
            unread_count: read_state.unread_count,
            is_near_bottom: read_state.is_near_bottom,
            fetch_in_flight: app.timeline().is_fetching(),
            logged_in: app.is_logged_in(),
            status_connected: app.connection_status().connected,
            bridge_connected: bridge.is_connected(),
            open_channels,
        }
    }
}

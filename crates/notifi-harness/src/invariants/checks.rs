//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Timeline ids strictly increase.
///
/// Implies no message is shown twice, however history pages and live
/// deliveries interleave. Holds only while the server delivers live messages
/// in id order; an out-of-order frame is kept at the tail.
pub struct TimelineOrdering;

impl Invariant for TimelineOrdering {
    fn name(&self) -> &'static str {
        "timeline_ordering"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if let Some(window) = client.message_ids.windows(2).find(|w| w[0] >= w[1]) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: id {} followed by {}",
                        client.device_id, window[0], window[1]
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A viewport at the bottom has nothing unread.
pub struct UnreadClearedAtBottom;

impl Invariant for UnreadClearedAtBottom {
    fn name(&self) -> &'static str {
        "unread_cleared_at_bottom"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if client.is_near_bottom && client.unread_count != 0 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: near bottom with {} unread",
                        client.device_id, client.unread_count
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The connection indicator matches the connection state machine.
pub struct ConnectionStatusAgrees;

impl Invariant for ConnectionStatusAgrees {
    fn name(&self) -> &'static str {
        "connection_status_agrees"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if client.status_connected != client.bridge_connected {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: indicator says {}, state machine says {}",
                        client.device_id, client.status_connected, client.bridge_connected
                    ),
                });
            }
        }
        Ok(())
    }
}

/// At most one live socket per client.
pub struct SingleLiveChannel;

impl Invariant for SingleLiveChannel {
    fn name(&self) -> &'static str {
        "single_live_channel"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if client.open_channels > 1 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: {} sockets open",
                        client.device_id, client.open_channels
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Without a token there is no history, no socket and no request.
pub struct LoggedOutIsQuiet;

impl Invariant for LoggedOutIsQuiet {
    fn name(&self) -> &'static str {
        "logged_out_is_quiet"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if client.logged_in {
                continue;
            }
            let leftovers = [
                (!client.message_ids.is_empty(), "messages"),
                (client.fetch_in_flight, "a history request"),
                (client.bridge_connected, "a connection"),
                (client.open_channels > 0, "a socket"),
            ];
            if let Some((_, what)) = leftovers.iter().find(|(present, _)| *present) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("client {}: logged out but has {what}", client.device_id),
                });
            }
        }
        Ok(())
    }
}

/// Clients sharing a server never share a device id.
pub struct DistinctDeviceIds;

impl Invariant for DistinctDeviceIds {
    fn name(&self) -> &'static str {
        "distinct_device_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();
        for client in &state.clients {
            if !seen.insert(client.device_id.as_str()) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("device id {} used twice", client.device_id),
                });
            }
        }
        Ok(())
    }
}

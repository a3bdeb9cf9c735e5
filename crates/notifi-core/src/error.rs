//! Error types for the client core.
//!
//! One error type per state machine: the connection lifecycle, the timeline
//! reconciler, and session storage used by the identity provider. None of them
//! is fatal; drivers log and carry on.

use thiserror::Error;

use crate::{
    connection::{ChannelId, ConnectionState},
    timeline::FetchTicket,
};

/// Errors from the connection state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// State transition not in the transition table.
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// State before the attempted transition
        from: ConnectionState,
        /// Requested state
        to: ConnectionState,
    },

    /// Channel event that cannot happen in the current state.
    #[error("unexpected {event} event in state {state:?}")]
    UnexpectedEvent {
        /// Current state when the event arrived
        state: ConnectionState,
        /// Event name
        event: &'static str,
    },

    /// Event from a channel that is no longer the current one.
    #[error("event from stale channel {channel}")]
    StaleChannel {
        /// Channel the event belongs to
        channel: ChannelId,
    },
}

impl ConnectionError {
    /// Event belonged to a replaced or abandoned channel and was ignored.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleChannel { .. })
    }
}

/// Errors from the timeline reconciler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    /// Fetch result arrived for a ticket that is no longer in flight.
    #[error("stale fetch result for ticket {ticket}")]
    StaleFetch {
        /// Ticket the result was issued for
        ticket: FetchTicket,
    },
}

/// Errors from tab-scoped session storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Storage cannot be accessed at all.
    #[error("session storage unavailable: {0}")]
    Unavailable(String),

    /// Write was rejected.
    #[error("session storage write failed: {0}")]
    WriteFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stale_channel_is_stale() {
        assert!(ConnectionError::StaleChannel { channel: ChannelId::new(3) }.is_stale());
        assert!(
            !ConnectionError::UnexpectedEvent {
                state: ConnectionState::Disconnected,
                event: "message"
            }
            .is_stale()
        );
        assert!(
            !ConnectionError::InvalidTransition {
                from: ConnectionState::Connected,
                to: ConnectionState::Connecting,
            }
            .is_stale()
        );
    }
}

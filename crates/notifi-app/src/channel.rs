//! Live-channel events and commands exchanged with the driver.
//!
//! The driver owns the socket. It reports what happened on a channel as
//! [`ChannelEvent`]s and executes [`ChannelCommand`]s produced by the
//! [`crate::Bridge`]. Every event carries the [`ChannelId`] it belongs to so
//! events from replaced sockets can be recognised and ignored.

use notifi_core::{ChannelId, DeviceId};
use notifi_proto::CloseCode;

/// Something happened on a live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Handshake completed.
    Opened {
        /// Channel id.
        channel: ChannelId,
    },

    /// Text frame received.
    Text {
        /// Channel id.
        channel: ChannelId,
        /// Frame payload.
        text: String,
    },

    /// Channel closed, by either side.
    Closed {
        /// Channel id.
        channel: ChannelId,
        /// Close code; 1006 when the connection dropped without a close frame.
        code: CloseCode,
    },

    /// Transport error: construction failed or the socket errored.
    Failed {
        /// Channel id.
        channel: ChannelId,
        /// Error description.
        reason: String,
    },
}

impl ChannelEvent {
    /// Channel this event belongs to.
    pub fn channel(&self) -> ChannelId {
        match self {
            Self::Opened { channel }
            | Self::Text { channel, .. }
            | Self::Closed { channel, .. }
            | Self::Failed { channel, .. } => *channel,
        }
    }
}

/// Instruction for the driver's channel layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Open `/ws/messages?deviceId=..&token=..` and report it as `channel`.
    Open {
        /// Id to report events under.
        channel: ChannelId,
        /// Bearer token.
        token: String,
        /// Device id of this client.
        device_id: DeviceId,
    },

    /// Send a close frame and drop the channel.
    Close {
        /// Channel to close.
        channel: ChannelId,
        /// Close code.
        code: CloseCode,
        /// Close reason.
        reason: String,
    },

    /// Drop a channel that never finished opening.
    Abandon {
        /// Channel to drop.
        channel: ChannelId,
    },
}

//! Application input events.
//!
//! This module defines [`AppEvent`], the set of inputs that drive the
//! [`crate::App`] state machine.
//!
//! Events originate from three sources:
//! - User interactions (login, send, scroll, settings) and periodic ticks.
//! - Completed requests reported by the driver (auth, history, send).
//! - Live-channel notifications translated by the [`crate::Bridge`].

use notifi_core::{FetchTicket, ViewportGeometry};
use notifi_proto::{AuthResponse, Credentials, Message, MessagePage};

use crate::{AuthMode, BatchSize, Upload};

/// Events processed by the App state machine.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Periodic tick. Expires notices and overdue fetches.
    Tick,

    /// User scrolled the message list.
    Scrolled(ViewportGeometry),

    /// Host finished laying out the message list.
    LayoutChanged {
        /// New total content height.
        scroll_height: u32,
    },

    /// User asked to jump to the newest message.
    JumpToBottom,

    /// User submitted the login or register form.
    Authenticate {
        /// Login or register.
        mode: AuthMode,
        /// Entered credentials.
        credentials: Credentials,
    },

    /// Auth request finished.
    AuthCompleted {
        /// Login or register.
        mode: AuthMode,
        /// Token and user id, or the error text to show.
        result: Result<AuthResponse, String>,
    },

    /// Token found in persistent storage at startup.
    TokenRestored {
        /// Stored bearer token.
        token: String,
    },

    /// User logged out.
    Logout,

    /// User submitted a message.
    Send {
        /// Text body.
        body: String,
        /// Attached files.
        attachments: Vec<Upload>,
    },

    /// Send request finished.
    SendCompleted {
        /// `Err` carries the error text to show.
        result: Result<(), String>,
    },

    /// History request finished.
    HistoryLoaded {
        /// Ticket the request was issued under.
        ticket: FetchTicket,
        /// Page, or the error text.
        result: Result<MessagePage, String>,
    },

    /// Live message delivered by the channel.
    MessageReceived(Message),

    /// Live channel went up or down.
    ConnectionChanged {
        /// New state.
        connected: bool,
    },

    /// User picked a batch size.
    BatchSizeChanged(BatchSize),

    /// User asked to quit.
    Quit,
}

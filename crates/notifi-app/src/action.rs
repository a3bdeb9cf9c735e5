//! Application side-effects and intents.
//!
//! This module defines the [`AppAction`] enum, which represents instructions
//! produced by the [`crate::App`] state machine for the runtime to execute.

use notifi_core::{FetchRequest, FetchTicket, ScrollCommand};
use notifi_proto::Credentials;

use crate::{AuthMode, Upload};

/// Actions produced by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Render the UI.
    Render,

    /// Quit the application.
    Quit,

    /// Scroll the message list.
    Scroll(ScrollCommand),

    /// Call the login or register endpoint.
    Authenticate {
        /// Login or register.
        mode: AuthMode,
        /// Credentials to send.
        credentials: Credentials,
    },

    /// Store the token for the next start.
    PersistToken {
        /// Bearer token.
        token: String,
    },

    /// Remove the stored token.
    ForgetToken,

    /// Request a history page.
    FetchHistory {
        /// Bearer token.
        token: String,
        /// Page to request.
        request: FetchRequest,
    },

    /// Abort a history request; its result, if any, is stale.
    CancelFetch {
        /// Ticket of the request.
        ticket: FetchTicket,
    },

    /// Post a message.
    SendMessage {
        /// Bearer token.
        token: String,
        /// Text body.
        body: String,
        /// Attached files.
        attachments: Vec<Upload>,
    },

    /// Connect the live channel, or reconnect it with a new token.
    Connect {
        /// Bearer token.
        token: String,
    },

    /// Shut the live channel down.
    Disconnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_contents_do_not_leak_into_debug() {
        let action = AppAction::SendMessage {
            token: "t".to_string(),
            body: "hi".to_string(),
            attachments: vec![Upload {
                filename: "a.bin".to_string(),
                mime_type: "application/octet-stream".to_string(),
                bytes: vec![0xde, 0xad],
            }],
        };
        let debug = format!("{action:?}");
        assert!(debug.contains("a.bin"));
        assert!(debug.contains("len: 2"));
        assert!(!debug.contains("222"));
    }
}

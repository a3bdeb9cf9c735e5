//! Observable application state types.
//!
//! These are the view-model pieces a frontend renders: who is logged in, the
//! transient notice, the live-connection status line and the batch-size
//! setting. None of them holds protocol state.

use std::fmt;

use notifi_core::{BrowserFamily, DeviceClass, Identity};

/// Authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No token.
    LoggedOut,
    /// Login or register request in flight.
    Authenticating,
    /// Token available.
    LoggedIn {
        /// Bearer token.
        token: String,
        /// Server user id. `None` when the token was restored from storage.
        user_id: Option<u64>,
    },
}

impl AuthState {
    /// Bearer token, if logged in.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::LoggedIn { token, .. } => Some(token.as_str()),
            Self::LoggedOut | Self::Authenticating => None,
        }
    }

    /// Logged-in user id, if known.
    pub fn user_id(&self) -> Option<u64> {
        match self {
            Self::LoggedIn { user_id, .. } => *user_id,
            Self::LoggedOut | Self::Authenticating => None,
        }
    }
}

/// Which auth endpoint to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `POST /auth/login`
    Login,
    /// `POST /auth/register`
    Register,
}

impl AuthMode {
    /// Notice shown on success.
    pub fn success_message(self) -> &'static str {
        match self {
            Self::Login => "Successfully logged in!",
            Self::Register => "Successfully registered!",
        }
    }
}

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoticeKind {
    /// Neutral.
    #[default]
    Default,
    /// Informational.
    Info,
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Error,
}

/// Transient user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Text.
    pub message: String,
    /// Severity.
    pub kind: NoticeKind,
}

impl Notice {
    /// Create a notice.
    pub fn new(message: impl Into<String>, kind: NoticeKind) -> Self {
        Self { message: message.into(), kind }
    }
}

/// Messages requested per history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchSize {
    /// 10 messages
    Ten,
    /// 20 messages
    #[default]
    Twenty,
    /// 50 messages
    Fifty,
}

impl BatchSize {
    /// All selectable sizes.
    pub const ALL: [Self; 3] = [Self::Ten, Self::Twenty, Self::Fifty];

    /// As a `limit` value.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Ten => 10,
            Self::Twenty => 20,
            Self::Fifty => 50,
        }
    }
}

impl TryFrom<u32> for BatchSize {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL.into_iter().find(|size| size.as_u32() == value).ok_or(value)
    }
}

/// Live-connection status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Channel open.
    pub connected: bool,
    /// Browser family of this client.
    pub browser: BrowserFamily,
    /// Device class of this client.
    pub device: DeviceClass,
    /// Random part of the tab id.
    pub tab: String,
}

impl ConnectionStatus {
    /// Disconnected status for `identity`.
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            connected: false,
            browser: identity.browser_family(),
            device: identity.device_class(),
            tab: identity.tab_suffix().to_string(),
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.connected { "Connected" } else { "Disconnected" };
        write!(f, "{state} ({} on {}, tab {})", self.browser, self.device, self.tab)
    }
}

/// File attached to an outgoing message.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    /// File name sent in the multipart part.
    pub filename: String,
    /// MIME type of the part.
    pub mime_type: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_values() {
        assert_eq!(BatchSize::default().as_u32(), 20);
        assert_eq!(BatchSize::try_from(50), Ok(BatchSize::Fifty));
        assert_eq!(BatchSize::try_from(25), Err(25));
    }

    #[test]
    fn status_line() {
        let status = ConnectionStatus {
            connected: true,
            browser: BrowserFamily::Firefox,
            device: DeviceClass::Desktop,
            tab: "k3j2h1x".to_string(),
        };
        assert_eq!(status.to_string(), "Connected (Firefox on Desktop, tab k3j2h1x)");
    }
}

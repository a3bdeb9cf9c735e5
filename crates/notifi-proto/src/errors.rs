//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while decoding payloads or building endpoint URLs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload was not valid JSON for the expected type.
    #[error("failed to decode {kind}: {reason}")]
    Decode {
        /// Payload type being decoded
        kind: &'static str,
        /// Decoder error message
        reason: String,
    },

    /// Payload could not be encoded.
    #[error("failed to encode {kind}: {reason}")]
    Encode {
        /// Payload type being encoded
        kind: &'static str,
        /// Encoder error message
        reason: String,
    },

    /// Base URL is unusable for building endpoints.
    #[error("invalid endpoint url {url}: {reason}")]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },
}

impl ProtocolError {
    pub(crate) fn decode(kind: &'static str, err: &serde_json::Error) -> Self {
        Self::Decode { kind, reason: err.to_string() }
    }
}

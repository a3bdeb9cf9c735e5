//! Authentication and error payloads.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Login / register request body.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Build credentials from email and password.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("email", &self.email).finish_non_exhaustive()
    }
}

/// Successful login / register response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Bearer token, the sole credential for later requests.
    pub token: String,
    /// Id of the authenticated user.
    pub user_id: u64,
}

impl AuthResponse {
    /// Decode a login / register response body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Decode` if the body lacks the token or user id
    pub fn decode(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| ProtocolError::decode("auth response", &e))
    }
}

/// Error body returned by the REST endpoints on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human readable error.
    pub error: String,
}

impl ErrorPayload {
    /// Extract the error text from a response body, if it is an error payload.
    pub fn from_body(body: &str) -> Option<String> {
        serde_json::from_str::<Self>(body).ok().map(|payload| payload.error)
    }
}

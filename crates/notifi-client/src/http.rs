//! REST client for history, send and auth.
//!
//! Thin reqwest wrapper: builds the request from [`Endpoints`], checks the
//! status and decodes the body with the protocol types. Failures carry the
//! server's error text when it sent one.

use notifi_app::{AuthMode, Upload};
use notifi_core::FetchRequest;
use notifi_proto::{AuthResponse, Credentials, Endpoints, ErrorPayload, MessagePage, ProtocolError};
use reqwest::{
    Response,
    multipart::{Form, Part},
};
use thiserror::Error;
use tracing::debug;

/// REST errors.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Request could not be sent or the body not read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("server returned {status}: {}", message.as_deref().unwrap_or("no error text"))]
    Status {
        /// HTTP status code
        status: u16,
        /// Error text from the response body
        message: Option<String>,
    },

    /// Response body did not decode.
    #[error(transparent)]
    Decode(#[from] ProtocolError),
}

impl HttpError {
    /// Text to show the user. Empty when the server gave no reason, so the
    /// caller's generic message applies.
    pub fn user_message(&self) -> String {
        match self {
            Self::Request(_) => "Network error".to_string(),
            Self::Status { message, .. } => message.clone().unwrap_or_default(),
            Self::Decode(e) => e.to_string(),
        }
    }
}

/// REST client for one server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl ApiClient {
    /// Client for `endpoints`.
    pub fn new(endpoints: Endpoints) -> Self {
        Self { http: reqwest::Client::new(), endpoints }
    }

    /// Server endpoints.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// `POST /auth/login` or `POST /auth/register`.
    ///
    /// # Errors
    ///
    /// - `HttpError::Request` on network failure
    /// - `HttpError::Status` if the server rejects the credentials
    /// - `HttpError::Decode` if the response lacks the token
    pub async fn authenticate(
        &self,
        mode: AuthMode,
        credentials: &Credentials,
    ) -> Result<AuthResponse, HttpError> {
        let url = match mode {
            AuthMode::Login => self.endpoints.login(),
            AuthMode::Register => self.endpoints.register(),
        };
        debug!(?mode, email = %credentials.email, "authenticating");

        let response = self.http.post(url).json(credentials).send().await?;
        let body = read_body(response).await?;
        Ok(AuthResponse::decode(&body)?)
    }

    /// `GET /messages?limit=..&before=..`.
    ///
    /// # Errors
    ///
    /// - `HttpError::Request` on network failure
    /// - `HttpError::Status` on a non-success status
    /// - `HttpError::Decode` if the body is not a page
    pub async fn history(
        &self,
        token: &str,
        request: &FetchRequest,
    ) -> Result<MessagePage, HttpError> {
        let url = self.endpoints.history(request.limit, request.before.as_deref());
        debug!(ticket = %request.ticket, %url, "fetching history");

        let response = self.http.get(url).bearer_auth(token).send().await?;
        let body = read_body(response).await?;
        Ok(MessagePage::decode(&body)?)
    }

    /// `POST /messages` as multipart form data.
    ///
    /// The form carries a `body` field and one `attachments` part per file.
    ///
    /// # Errors
    ///
    /// - `HttpError::Request` on network failure or an invalid MIME type
    /// - `HttpError::Status` if the server rejects the message
    pub async fn send(
        &self,
        token: &str,
        body: String,
        attachments: Vec<Upload>,
    ) -> Result<(), HttpError> {
        let count = attachments.len();
        let mut form = Form::new().text("body", body);
        for upload in attachments {
            let part = Part::bytes(upload.bytes)
                .file_name(upload.filename)
                .mime_str(&upload.mime_type)?;
            form = form.part("attachments", part);
        }
        debug!(attachments = count, "sending message");

        let response =
            self.http.post(self.endpoints.send()).bearer_auth(token).multipart(form).send().await?;
        read_body(response).await?;
        Ok(())
    }
}

async fn read_body(response: Response) -> Result<String, HttpError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(HttpError::Status { status: status.as_u16(), message: ErrorPayload::from_body(&body) })
    }
}

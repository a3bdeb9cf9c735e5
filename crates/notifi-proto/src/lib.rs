//! Wire types for the Notifi chat API.
//!
//! Everything the client exchanges with the server is defined here: the
//! [`Message`] objects pushed over the live channel, the paginated
//! [`MessagePage`] returned by the history endpoint, authentication payloads,
//! WebSocket [`CloseCode`]s and the [`Endpoints`] URL builder.
//!
//! All payloads are JSON. Field names follow the server's wire format
//! (`user_id`, `hasMore`, ...) while the Rust side uses idiomatic names.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod close;
pub mod endpoint;
pub mod errors;
pub mod message;
pub mod page;

pub use auth::{AuthResponse, Credentials, ErrorPayload};
pub use close::CloseCode;
pub use endpoint::Endpoints;
pub use errors::{ProtocolError, Result};
pub use message::{Attachment, Message, MessageId};
pub use page::MessagePage;

//! Notifi network client.
//!
//! Wires the Sans-IO state machines of [`notifi_core`] and the orchestration
//! of [`notifi_app`] to real I/O: reqwest for the REST API, tokio-tungstenite
//! for the live channel, stdin/stdout for the user.
//!
//! # Components
//!
//! - [`ClientConfig`]: flag / environment / default resolution
//! - [`ApiClient`]: history, send and auth requests
//! - [`LiveChannel`]: one WebSocket task per channel id
//! - [`NetworkDriver`]: [`notifi_app::Driver`] over the above
//! - [`TerminalView`]: append-only rendering and virtual scroll geometry
//! - [`TokenStore`]: bearer token kept between runs
//! - [`SystemEnv`]: real clock and OS randomness

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod http;
pub mod network;
pub mod system_env;
pub mod terminal;
pub mod token_store;
pub mod transport;

pub use config::{ClientConfig, ConfigError, ConfigOverrides};
pub use http::{ApiClient, HttpError};
pub use network::{DriverError, NetworkDriver};
pub use system_env::SystemEnv;
pub use terminal::TerminalView;
pub use token_store::TokenStore;
pub use transport::LiveChannel;

//! Core state machines for the Notifi chat client.
//!
//! Everything in this crate is Sans-IO: methods take the current time as an
//! argument and return actions for a driver to execute. No sockets, no timers,
//! no HTTP. This keeps the reconnect policy and the message merge logic
//! deterministic and directly testable.
//!
//! # Components
//!
//! - [`identity`]: per-tab [`Identity`] and its [`DeviceId`]
//! - [`connection`]: live-channel lifecycle and reconnect policy
//! - [`timeline`]: reconciliation of live messages with paginated history
//! - [`viewport`]: scroll geometry decisions (auto-scroll, unread, pagination)
//! - [`env`]: time and randomness abstraction

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod identity;
pub mod timeline;
pub mod viewport;

pub use connection::{
    ChannelId, Connection, ConnectionAction, ConnectionConfig, ConnectionState, ReconnectPolicy,
};
pub use env::{Environment, MonotonicInstant};
pub use error::{ConnectionError, StorageError, TimelineError};
pub use identity::{
    BrowserFamily, DeviceClass, DeviceId, HostInfo, Identity, MemorySessionStore, SessionStore,
};
pub use timeline::{
    FetchKind, FetchRequest, FetchTicket, LiveOutcome, PageOutcome, ReadState, Timeline,
    TimelineConfig,
};
pub use viewport::{
    ScrollAnchor, ScrollBehavior, ScrollCommand, ScrollCoordinator, ViewportConfig,
    ViewportGeometry,
};

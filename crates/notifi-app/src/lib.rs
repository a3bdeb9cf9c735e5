//! Application layer for Notifi
//!
//! Pure state machines and a generic runtime for the chat client, so the same
//! orchestration code runs in production and in deterministic simulation.
//!
//! # Components
//!
//! - [`App`]: view-model state machine (auth, timeline, viewport, notices)
//! - [`Bridge`]: connection manager facade (listeners, channel commands)
//! - [`Driver`]: trait for platform-specific I/O abstraction
//! - [`Runtime`]: generic orchestration loop using Driver

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod app;
mod bridge;
mod channel;
mod driver;
mod event;
mod runtime;
mod state;

pub use action::AppAction;
pub use app::{App, AppConfig, TimelineEntry};
pub use bridge::Bridge;
pub use channel::{ChannelCommand, ChannelEvent};
pub use driver::{Driver, Input};
pub use event::AppEvent;
pub use runtime::Runtime;
pub use state::{AuthMode, AuthState, BatchSize, ConnectionStatus, Notice, NoticeKind, Upload};

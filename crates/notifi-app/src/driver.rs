//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the application runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.
//!
//! Requests (auth, history, send, channel commands) are started by the
//! runtime and complete asynchronously: the driver reports their outcome as a
//! later [`Input`].

use std::future::Future;

use notifi_core::{FetchRequest, FetchTicket, MonotonicInstant, ScrollCommand};
use notifi_proto::Credentials;

use crate::{App, AppEvent, AuthMode, ChannelCommand, ChannelEvent, Upload};

/// Something the driver observed.
#[derive(Debug, Clone)]
pub enum Input {
    /// User input or a completed request, for the App.
    App(AppEvent),
    /// Live-channel event, for the Bridge.
    Channel(ChannelEvent),
    /// Host visibility changed.
    Visibility(bool),
}

/// Abstracts I/O operations for the application runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration logic. This ensures
/// the same orchestration code runs in the network client and simulation.
///
/// # Implementations
///
/// - **Network**: reqwest for REST, tokio-tungstenite for the live channel
/// - **Simulation**: in-memory server with virtual time
///
/// # Associated Types
///
/// - [`Error`](Driver::Error): Platform-specific error type
/// - [`Instant`](Driver::Instant): Time representation (real or virtual)
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: MonotonicInstant;

    /// Wait for the next input.
    ///
    /// Returns `None` once `deadline` has passed without input, so the
    /// runtime can fire timers.
    fn next_input(
        &mut self,
        deadline: Option<Self::Instant>,
    ) -> impl Future<Output = Result<Option<Input>, Self::Error>> + Send;

    /// Execute a live-channel command. Outcomes arrive as
    /// [`Input::Channel`].
    fn channel(&mut self, command: ChannelCommand);

    /// Start a history request. Reported as [`AppEvent::HistoryLoaded`].
    fn fetch_history(&mut self, token: &str, request: FetchRequest);

    /// Abort a history request. Its result must not be reported.
    fn cancel_fetch(&mut self, ticket: FetchTicket);

    /// Start a send. Reported as [`AppEvent::SendCompleted`].
    fn send_message(&mut self, token: &str, body: String, attachments: Vec<Upload>);

    /// Start a login or register request. Reported as
    /// [`AppEvent::AuthCompleted`].
    fn authenticate(&mut self, mode: AuthMode, credentials: Credentials);

    /// Store the token, or remove it with `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token store cannot be written.
    fn persist_token(&mut self, token: Option<&str>) -> Result<(), Self::Error>;

    /// Scroll the message list.
    fn scroll(&mut self, command: ScrollCommand);

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Render the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, app: &App<Self::Instant>) -> Result<(), Self::Error>;

    /// Abort outstanding requests and release resources.
    fn stop(&mut self);
}

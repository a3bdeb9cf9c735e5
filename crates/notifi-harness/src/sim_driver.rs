//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the network driver but answers
//! every request synchronously from a [`SimServer`]. It implements [`Driver`]
//! so the same [`notifi_app::Runtime`] orchestration code runs in both
//! production and simulation.
//!
//! Responses are queued as inputs rather than applied directly, so they go
//! through the runtime in the same order a real driver would report them.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use notifi_app::{App, AppEvent, AuthMode, ChannelCommand, ChannelEvent, Driver, Input, Upload};
use notifi_core::{FetchRequest, FetchTicket, ScrollCommand, ViewportGeometry};
use notifi_proto::{CloseCode, Credentials, Message};
use tokio::time::Instant;
use tracing::debug;

use crate::sim_server::{SharedSimServer, SimServer};

/// Height of one simulated message row in pixels.
pub const ROW_HEIGHT: u32 = 24;

/// Rows visible in the simulated viewport.
pub const VISIBLE_ROWS: u32 = 10;

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// Shared state for event injection.
///
/// This allows injection from outside async contexts.
#[derive(Default)]
struct SharedState {
    pending: VecDeque<Input>,
    held_fetches: VecDeque<Input>,
    hold_fetches: bool,
    channel_log: Vec<ChannelCommand>,
    scrolls: Vec<ScrollCommand>,
    stored_token: Option<String>,
    renders: usize,
    stopped: bool,
    geometry: ViewportGeometry,
}

impl SharedState {
    fn max_scroll_top(&self) -> u32 {
        self.geometry.scroll_height.saturating_sub(self.geometry.client_height)
    }
}

/// Simulation driver for deterministic testing.
pub struct SimDriver {
    client: u64,
    state: Arc<Mutex<SharedState>>,
    server: SharedSimServer,
}

impl SimDriver {
    /// Create a driver talking to `server`.
    pub fn new(server: SharedSimServer) -> Self {
        let client = server.lock().unwrap_or_else(PoisonError::into_inner).attach_client();
        let state = SharedState {
            geometry: ViewportGeometry::new(0, 0, VISIBLE_ROWS * ROW_HEIGHT),
            ..SharedState::default()
        };
        Self { client, state: Arc::new(Mutex::new(state)), server }
    }

    /// Id of this client on the simulated server.
    pub fn client_id(&self) -> u64 {
        self.client
    }

    /// Move frames the server pushed to this client into the input queue.
    fn pull_deliveries(&self) {
        let frames = self.server().take_deliveries(self.client);
        if frames.is_empty() {
            return;
        }
        let mut state = self.lock();
        for (channel, text) in frames {
            state.pending.push_back(Input::Channel(ChannelEvent::Text { channel, text }));
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn server(&self) -> MutexGuard<'_, SimServer> {
        self.server.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inject an `AppEvent` for processing.
    pub fn inject_event(&self, event: AppEvent) {
        self.lock().pending.push_back(Input::App(event));
    }

    /// Inject a visibility change.
    pub fn inject_visibility(&self, visible: bool) {
        self.lock().pending.push_back(Input::Visibility(visible));
    }

    /// Check if there are pending inputs to process.
    pub fn has_pending(&self) -> bool {
        self.pull_deliveries();
        !self.lock().pending.is_empty()
    }

    /// Another user posts a message; every live channel receives it.
    pub fn post_remote(&self, email: &str, body: &str) -> Message {
        self.server().post_as(email, body)
    }

    /// Deliver an already-known message again on every live channel.
    pub fn redeliver(&self, message: &Message) {
        self.server().redeliver(message);
    }

    /// The server closes this client's live channels with `code`.
    pub fn drop_live(&self, code: CloseCode) {
        let channels = self.server().drop_subscriptions(self.client);
        let mut state = self.lock();
        for channel in channels {
            state.pending.push_back(Input::Channel(ChannelEvent::Closed { channel, code }));
        }
    }

    /// Take the server's live endpoint down or bring it back.
    pub fn set_live_available(&self, available: bool) {
        self.server().set_live_available(available);
    }

    /// Hold history responses until [`Self::release_fetches`].
    pub fn hold_fetches(&self) {
        self.lock().hold_fetches = true;
    }

    /// Deliver held history responses and stop holding.
    pub fn release_fetches(&self) {
        let mut state = self.lock();
        state.hold_fetches = false;
        let held = std::mem::take(&mut state.held_fetches);
        state.pending.extend(held);
    }

    /// The user scrolls to the very top.
    pub fn scroll_to_top(&self) {
        let mut state = self.lock();
        state.geometry.scroll_top = 0;
        let geometry = state.geometry;
        state.pending.push_back(Input::App(AppEvent::Scrolled(geometry)));
    }

    /// The user scrolls by `rows` (negative is up).
    pub fn scroll_by(&self, rows: i32) {
        let mut state = self.lock();
        let delta = rows.unsigned_abs() * ROW_HEIGHT;
        let top = if rows < 0 {
            state.geometry.scroll_top.saturating_sub(delta)
        } else {
            state.geometry.scroll_top.saturating_add(delta)
        };
        state.geometry.scroll_top = top.min(state.max_scroll_top());
        let geometry = state.geometry;
        state.pending.push_back(Input::App(AppEvent::Scrolled(geometry)));
    }

    /// Current simulated viewport.
    pub fn geometry(&self) -> ViewportGeometry {
        self.lock().geometry
    }

    /// Live channels the server holds for this client.
    pub fn open_channels(&self) -> usize {
        self.server().subscriptions(self.client)
    }

    /// Every channel command executed so far.
    pub fn channel_log(&self) -> Vec<ChannelCommand> {
        self.lock().channel_log.clone()
    }

    /// Every scroll command executed so far.
    pub fn scrolls(&self) -> Vec<ScrollCommand> {
        self.lock().scrolls.clone()
    }

    /// Token persisted by the runtime.
    pub fn stored_token(&self) -> Option<String> {
        self.lock().stored_token.clone()
    }

    /// Number of renders.
    pub fn renders(&self) -> usize {
        self.lock().renders
    }

    /// Whether the runtime stopped the driver.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    fn complete(&self, input: Input) {
        self.lock().pending.push_back(input);
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = Instant;

    async fn next_input(&mut self, deadline: Option<Instant>) -> Result<Option<Input>, Self::Error> {
        self.pull_deliveries();
        let next = self.lock().pending.pop_front();
        if let Some(input) = next {
            return Ok(Some(input));
        }
        match deadline {
            Some(at) => {
                tokio::time::sleep_until(at).await;
                Ok(None)
            },
            // Idle with no timers: the simulated user leaves
            None => Ok(Some(Input::App(AppEvent::Quit))),
        }
    }

    fn channel(&mut self, command: ChannelCommand) {
        self.lock().channel_log.push(command.clone());
        let event = match command {
            ChannelCommand::Open { channel, .. } => {
                match self.server().subscribe(self.client, channel) {
                    Ok(()) => ChannelEvent::Opened { channel },
                    Err(reason) => ChannelEvent::Failed { channel, reason },
                }
            },
            ChannelCommand::Close { channel, .. } | ChannelCommand::Abandon { channel } => {
                self.server().unsubscribe(self.client, channel);
                return;
            },
        };
        self.complete(Input::Channel(event));
    }

    fn fetch_history(&mut self, token: &str, request: FetchRequest) {
        let result = self.server().history(token, request.limit, request.before.as_deref());
        let input = Input::App(AppEvent::HistoryLoaded { ticket: request.ticket, result });

        let mut state = self.lock();
        if state.hold_fetches {
            state.held_fetches.push_back(input);
        } else {
            state.pending.push_back(input);
        }
    }

    fn cancel_fetch(&mut self, ticket: FetchTicket) {
        debug!(ticket = %ticket, "cancelling simulated fetch");
        let is_other = |input: &Input| {
            !matches!(input, Input::App(AppEvent::HistoryLoaded { ticket: t, .. }) if *t == ticket)
        };
        let mut state = self.lock();
        state.pending.retain(is_other);
        state.held_fetches.retain(is_other);
    }

    fn send_message(&mut self, token: &str, body: String, attachments: Vec<Upload>) {
        let result = self.server().post(token, &body, &attachments).map(|_| ());
        self.pull_deliveries();
        self.complete(Input::App(AppEvent::SendCompleted { result }));
    }

    fn authenticate(&mut self, mode: AuthMode, credentials: Credentials) {
        let result = {
            let mut server = self.server();
            match mode {
                AuthMode::Login => server.login(&credentials),
                AuthMode::Register => server.register(&credentials),
            }
        };
        self.complete(Input::App(AppEvent::AuthCompleted { mode, result }));
    }

    fn persist_token(&mut self, token: Option<&str>) -> Result<(), Self::Error> {
        self.lock().stored_token = token.map(str::to_string);
        Ok(())
    }

    fn scroll(&mut self, command: ScrollCommand) {
        let mut state = self.lock();
        state.scrolls.push(command);
        state.geometry.scroll_top = match command {
            ScrollCommand::ToBottom(_) => state.max_scroll_top(),
            ScrollCommand::To { top } => top.min(state.max_scroll_top()),
        };
        let geometry = state.geometry;
        state.pending.push_back(Input::App(AppEvent::Scrolled(geometry)));
    }

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn render(&mut self, app: &App<Instant>) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.renders += 1;

        let height = app.timeline().len() as u32 * ROW_HEIGHT;
        if height != state.geometry.scroll_height {
            state.geometry.scroll_height = height;
            state.geometry.scroll_top = state.geometry.scroll_top.min(state.max_scroll_top());
            state.pending.push_back(Input::App(AppEvent::LayoutChanged { scroll_height: height }));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.server().drop_subscriptions(self.client);
        let mut state = self.lock();
        state.stopped = true;
        state.pending.clear();
        state.held_fetches.clear();
    }
}

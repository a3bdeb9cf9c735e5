//! Application state machine.
//!
//! This module defines the [`App`] state machine, which owns the interactive
//! state of the chat client completely decoupled from I/O and the live-channel
//! mechanics.
//!
//! This is a pure state machine: it consumes [`crate::AppEvent`] inputs (plus
//! the current time) and produces [`crate::AppAction`] instructions for the
//! runtime to execute.
//!
//! # Responsibilities
//!
//! - Login, register, token restore and logout.
//! - The reconciled timeline and its read state, fed by history pages and
//!   live messages.
//! - Viewport policy: pagination near the top, anchor restore, auto-scroll.
//! - One transient notice at a time, expiring after a fixed delay.
//! - Timing out history fetches that never resolve.

use std::time::Duration;

use notifi_core::{
    FetchKind, FetchRequest, FetchTicket, Identity, LiveOutcome, MonotonicInstant, ReadState,
    ScrollCoordinator, Timeline, TimelineConfig, ViewportConfig,
};
use notifi_proto::{Message, MessagePage};
use tracing::{debug, info, warn};

use crate::{AppAction, AppEvent, AuthState, BatchSize, ConnectionStatus, Notice, NoticeKind};

/// How long a notice stays visible.
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(5);

/// How long a history fetch may stay unresolved.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

const FETCH_FAILED: &str = "Failed to fetch messages";
const SEND_FAILED: &str = "Failed to send message";
const AUTH_FAILED: &str = "Authentication failed";

/// App configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppConfig {
    /// Notice lifetime
    pub notice_ttl: Duration,
    /// History fetch timeout
    pub fetch_timeout: Duration,
    /// Initial messages per fetch
    pub batch_size: BatchSize,
    /// Viewport thresholds
    pub viewport: ViewportConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            notice_ttl: DEFAULT_NOTICE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            batch_size: BatchSize::default(),
            viewport: ViewportConfig::default(),
        }
    }
}

/// One row of the rendered timeline.
#[derive(Debug, Clone, Copy)]
pub struct TimelineEntry<'a> {
    /// The message.
    pub message: &'a Message,
    /// First message of a UTC calendar day.
    pub starts_new_day: bool,
    /// Authored by the logged-in user.
    pub is_own: bool,
}

/// Application state machine.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies - fully testable in simulation.
#[derive(Debug, Clone)]
pub struct App<I> {
    config: AppConfig,
    auth: AuthState,
    timeline: Timeline,
    scroll: ScrollCoordinator,
    batch_size: BatchSize,
    connection: ConnectionStatus,
    /// Visible notice and when it was shown.
    notice: Option<(Notice, I)>,
    /// In-flight fetch and when it was issued.
    fetch_started: Option<(FetchTicket, I)>,
    sending: bool,
}

impl<I: MonotonicInstant> App<I> {
    /// Create a logged-out App for the client identified by `identity`.
    pub fn new(identity: &Identity, config: AppConfig) -> Self {
        Self {
            config,
            auth: AuthState::LoggedOut,
            timeline: Timeline::new(TimelineConfig { page_size: config.batch_size.as_u32() }),
            scroll: ScrollCoordinator::new(config.viewport),
            batch_size: config.batch_size,
            connection: ConnectionStatus::for_identity(identity),
            notice: None,
            fetch_started: None,
            sending: false,
        }
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: AppEvent, now: I) -> Vec<AppAction> {
        match event {
            AppEvent::Tick => self.tick(now),
            AppEvent::Scrolled(geometry) => {
                let mut actions = Vec::new();
                if let Some(request) = self.scroll.on_scroll(geometry, &mut self.timeline) {
                    actions.extend(self.fetch(request, now));
                }
                actions.push(AppAction::Render);
                actions
            },
            AppEvent::LayoutChanged { scroll_height } => {
                self.scroll.on_layout(scroll_height).map(AppAction::Scroll).into_iter().collect()
            },
            AppEvent::JumpToBottom => {
                let command = self.scroll.jump_to_bottom(&mut self.timeline);
                vec![AppAction::Scroll(command), AppAction::Render]
            },
            AppEvent::Authenticate { mode, credentials } => {
                if self.auth != AuthState::LoggedOut {
                    debug!(state = ?self.auth, "ignoring auth request");
                    return Vec::new();
                }
                self.auth = AuthState::Authenticating;
                vec![AppAction::Authenticate { mode, credentials }, AppAction::Render]
            },
            AppEvent::AuthCompleted { mode, result } => {
                if self.auth != AuthState::Authenticating {
                    debug!("ignoring auth result, no longer authenticating");
                    return Vec::new();
                }
                match result {
                    Ok(response) if !response.token.is_empty() => {
                        let actions = self.log_in(response.token, Some(response.user_id), now);
                        self.show(Notice::new(mode.success_message(), NoticeKind::Success), now);
                        actions
                    },
                    Ok(_) => self.auth_failed(AUTH_FAILED.to_string(), now),
                    Err(message) => self.auth_failed(message, now),
                }
            },
            AppEvent::TokenRestored { token } => {
                if token.is_empty() || self.auth.token().is_some() {
                    return Vec::new();
                }
                self.log_in(token, None, now)
            },
            AppEvent::Logout => self.log_out(now),
            AppEvent::Send { body, attachments } => {
                let Some(token) = self.auth.token() else {
                    self.show(Notice::new("Log in to send messages", NoticeKind::Error), now);
                    return vec![AppAction::Render];
                };
                if body.trim().is_empty() && attachments.is_empty() {
                    return Vec::new();
                }
                let token = token.to_string();
                self.sending = true;
                vec![AppAction::SendMessage { token, body, attachments }, AppAction::Render]
            },
            AppEvent::SendCompleted { result } => {
                self.sending = false;
                if let Err(message) = result {
                    let message = if message.is_empty() { SEND_FAILED.to_string() } else { message };
                    self.show(Notice::new(message, NoticeKind::Error), now);
                }
                vec![AppAction::Render]
            },
            AppEvent::HistoryLoaded { ticket, result } => self.history_loaded(ticket, result, now),
            AppEvent::MessageReceived(message) => {
                if self.auth.token().is_none() {
                    debug!(id = message.id, "dropping live message while logged out");
                    return Vec::new();
                }
                let was_empty = self.timeline.is_empty();
                let outcome = self.timeline.apply_live(message);
                self.scroll.on_live(outcome, was_empty, &self.timeline);
                if outcome == LiveOutcome::Duplicate { Vec::new() } else { vec![AppAction::Render] }
            },
            AppEvent::ConnectionChanged { connected } => {
                self.connection.connected = connected;
                vec![AppAction::Render]
            },
            AppEvent::BatchSizeChanged(size) => {
                self.batch_size = size;
                self.timeline.set_page_size(size.as_u32());
                vec![AppAction::Render]
            },
            AppEvent::Quit => vec![AppAction::Quit],
        }
    }

    /// Earliest instant at which a [`AppEvent::Tick`] has work to do.
    pub fn next_deadline(&self) -> Option<I> {
        let notice = self.notice.as_ref().map(|(_, shown)| *shown + self.config.notice_ttl);
        let fetch = self.fetch_started.map(|(_, started)| started + self.config.fetch_timeout);
        match (notice, fetch) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Authentication state.
    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    /// Whether a token is available.
    pub fn is_logged_in(&self) -> bool {
        self.auth.token().is_some()
    }

    /// Reconciled timeline.
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Read/unread state.
    pub fn read_state(&self) -> &ReadState {
        self.timeline.read_state()
    }

    /// Timeline rows with day-break and ownership flags.
    pub fn entries(&self) -> impl Iterator<Item = TimelineEntry<'_>> {
        let user_id = self.auth.user_id();
        self.timeline.messages().iter().enumerate().map(move |(index, message)| TimelineEntry {
            message,
            starts_new_day: self.timeline.starts_new_day(index),
            is_own: user_id == Some(message.author_user_id),
        })
    }

    /// Whether `message` was written by the logged-in user.
    pub fn is_own(&self, message: &Message) -> bool {
        self.auth.user_id() == Some(message.author_user_id)
    }

    /// Visible notice. `None` if nothing to show.
    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref().map(|(notice, _)| notice)
    }

    /// Live-connection status line.
    pub fn connection_status(&self) -> &ConnectionStatus {
        &self.connection
    }

    /// Messages per history fetch.
    pub fn batch_size(&self) -> BatchSize {
        self.batch_size
    }

    /// A send request is in flight.
    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// Older history is being loaded.
    pub fn is_loading_more(&self) -> bool {
        self.timeline.in_flight().is_some_and(|ticket| ticket.kind() == FetchKind::Backward)
    }

    /// Viewport coordinator.
    pub fn scroll(&self) -> &ScrollCoordinator {
        &self.scroll
    }

    fn tick(&mut self, now: I) -> Vec<AppAction> {
        let mut actions = Vec::new();
        let mut changed = false;

        if let Some((_, shown)) = &self.notice
            && now - *shown >= self.config.notice_ttl
        {
            self.notice = None;
            changed = true;
        }

        if let Some((ticket, started)) = self.fetch_started
            && now - started >= self.config.fetch_timeout
        {
            self.fetch_started = None;
            if self.timeline.fail_fetch(ticket).is_ok() {
                warn!(ticket = %ticket, "history fetch timed out");
                self.scroll.on_fetch_abandoned(ticket);
                self.show(Notice::new(FETCH_FAILED, NoticeKind::Error), now);
                actions.push(AppAction::CancelFetch { ticket });
                changed = true;
            }
        }

        if changed {
            actions.push(AppAction::Render);
        }
        actions
    }

    fn fetch(&mut self, request: FetchRequest, now: I) -> Vec<AppAction> {
        let Some(token) = self.auth.token() else {
            self.timeline.cancel_fetch();
            self.scroll.on_fetch_abandoned(request.ticket);
            return Vec::new();
        };
        let token = token.to_string();
        debug!(ticket = %request.ticket, before = ?request.before, "fetching history");
        self.fetch_started = Some((request.ticket, now));
        vec![AppAction::FetchHistory { token, request }]
    }

    fn log_in(&mut self, token: String, user_id: Option<u64>, now: I) -> Vec<AppAction> {
        let mut actions = Vec::new();
        if let Some(previous) = self.timeline.in_flight() {
            actions.push(AppAction::CancelFetch { ticket: previous });
        }
        self.auth = AuthState::LoggedIn { token: token.clone(), user_id };
        if user_id.is_some() {
            actions.push(AppAction::PersistToken { token: token.clone() });
        }

        let request = self.timeline.begin_initial_fetch();
        self.fetch_started = Some((request.ticket, now));
        info!(user_id = ?user_id, "logged in");

        actions.push(AppAction::FetchHistory { token: token.clone(), request });
        actions.push(AppAction::Connect { token });
        actions.push(AppAction::Render);
        actions
    }

    fn auth_failed(&mut self, message: String, now: I) -> Vec<AppAction> {
        let message = if message.is_empty() { AUTH_FAILED.to_string() } else { message };
        warn!(error = %message, "authentication failed");
        self.auth = AuthState::LoggedOut;
        self.show(Notice::new(message, NoticeKind::Error), now);
        vec![AppAction::Render]
    }

    fn log_out(&mut self, now: I) -> Vec<AppAction> {
        let mut actions = Vec::new();
        if let Some(ticket) = self.timeline.in_flight() {
            actions.push(AppAction::CancelFetch { ticket });
        }

        self.timeline.clear();
        self.scroll.reset();
        self.fetch_started = None;
        self.sending = false;
        self.auth = AuthState::LoggedOut;
        info!("logged out");
        self.show(Notice::new("Logged out successfully", NoticeKind::Info), now);

        actions.extend([AppAction::Disconnect, AppAction::ForgetToken, AppAction::Render]);
        actions
    }

    fn history_loaded(
        &mut self,
        ticket: FetchTicket,
        result: Result<MessagePage, String>,
        now: I,
    ) -> Vec<AppAction> {
        if self.fetch_started.is_some_and(|(pending, _)| pending == ticket) {
            self.fetch_started = None;
        }

        match result {
            Ok(page) => {
                let was_empty = self.timeline.is_empty() || ticket.kind() == FetchKind::Initial;
                match self.timeline.complete_fetch(ticket, page) {
                    Ok(_) => {
                        self.scroll.on_page_applied(ticket, was_empty, &mut self.timeline);
                        vec![AppAction::Render]
                    },
                    Err(e) => {
                        debug!(error = %e, "discarding history page");
                        Vec::new()
                    },
                }
            },
            Err(message) => match self.timeline.fail_fetch(ticket) {
                Ok(()) => {
                    warn!(ticket = %ticket, error = %message, "history fetch failed");
                    self.scroll.on_fetch_abandoned(ticket);
                    self.show(Notice::new(FETCH_FAILED, NoticeKind::Error), now);
                    vec![AppAction::Render]
                },
                Err(e) => {
                    debug!(error = %e, "discarding history error");
                    Vec::new()
                },
            },
        }
    }

    fn show(&mut self, notice: Notice, now: I) {
        debug!(message = %notice.message, kind = ?notice.kind, "notice");
        self.notice = Some((notice, now));
    }
}

#[cfg(test)]
mod tests {
    use std::{ops::RangeInclusive, time::Instant};

    use notifi_core::{
        Environment, HostInfo, MemorySessionStore, ScrollBehavior, ScrollCommand, ViewportGeometry,
    };
    use notifi_proto::{AuthResponse, Credentials};

    use super::*;
    use crate::AuthMode;

    #[derive(Clone)]
    struct FixedEnv;

    impl Environment for FixedEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(7);
        }

        fn wall_clock_millis(&self) -> u64 {
            0
        }
    }

    fn identity() -> Identity {
        Identity::create(
            &FixedEnv,
            &HostInfo::new("Linux", "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Firefox/125.0"),
            &mut MemorySessionStore::new(),
        )
    }

    fn message(id: u64, day: u32) -> Message {
        Message {
            id,
            body: format!("m{id}"),
            timestamp: format!("2024-05-{day:02}T10:00:00Z"),
            author_user_id: if id % 2 == 0 { 1 } else { 2 },
            author_email: "a@example.com".to_string(),
            attachments: Vec::new(),
        }
    }

    fn page(ids: RangeInclusive<u64>, has_more: bool) -> MessagePage {
        let cursor = ids.start().to_string();
        MessagePage {
            messages: ids.map(|id| message(id, 1)).collect(),
            has_more,
            next_cursor: has_more.then_some(cursor),
        }
    }

    fn fetch_request(actions: &[AppAction]) -> FetchRequest {
        actions
            .iter()
            .find_map(|a| match a {
                AppAction::FetchHistory { request, .. } => Some(request.clone()),
                _ => None,
            })
            .unwrap()
    }

    fn logged_in(now: Instant) -> (App<Instant>, FetchRequest) {
        let mut app = App::new(&identity(), AppConfig::default());
        let _ = app.handle(
            AppEvent::Authenticate {
                mode: AuthMode::Login,
                credentials: Credentials::new("a@example.com", "secret"),
            },
            now,
        );
        let actions = app.handle(
            AppEvent::AuthCompleted {
                mode: AuthMode::Login,
                result: Ok(AuthResponse { token: "tok".to_string(), user_id: 1 }),
            },
            now,
        );
        let request = fetch_request(&actions);
        (app, request)
    }

    #[test]
    fn login_fetches_history_and_connects() {
        let now = Instant::now();
        let mut app = App::new(&identity(), AppConfig::default());

        let actions = app.handle(
            AppEvent::Authenticate {
                mode: AuthMode::Login,
                credentials: Credentials::new("a@example.com", "secret"),
            },
            now,
        );
        assert!(matches!(actions.as_slice(), [AppAction::Authenticate { .. }, AppAction::Render]));
        assert_eq!(app.auth(), &AuthState::Authenticating);

        let actions = app.handle(
            AppEvent::AuthCompleted {
                mode: AuthMode::Login,
                result: Ok(AuthResponse { token: "tok".to_string(), user_id: 1 }),
            },
            now,
        );
        assert!(matches!(actions.as_slice(), [
            AppAction::PersistToken { .. },
            AppAction::FetchHistory { request: FetchRequest { limit: 20, before: None, .. }, .. },
            AppAction::Connect { .. },
            AppAction::Render
        ]));
        assert_eq!(app.auth().user_id(), Some(1));
        assert_eq!(app.notice().map(|n| n.message.as_str()), Some("Successfully logged in!"));
    }

    #[test]
    fn second_auth_request_is_ignored() {
        let now = Instant::now();
        let mut app = App::<Instant>::new(&identity(), AppConfig::default());
        let submit = AppEvent::Authenticate {
            mode: AuthMode::Register,
            credentials: Credentials::new("a@example.com", "secret"),
        };

        assert_eq!(app.handle(submit.clone(), now).len(), 2);
        assert!(app.handle(submit, now).is_empty());
    }

    #[test]
    fn auth_failure_shows_server_error() {
        let now = Instant::now();
        let mut app = App::new(&identity(), AppConfig::default());
        let _ = app.handle(
            AppEvent::Authenticate {
                mode: AuthMode::Login,
                credentials: Credentials::new("a@example.com", "wrong"),
            },
            now,
        );

        let actions = app.handle(
            AppEvent::AuthCompleted {
                mode: AuthMode::Login,
                result: Err("Invalid credentials".to_string()),
            },
            now,
        );

        assert_eq!(actions, vec![AppAction::Render]);
        assert_eq!(app.auth(), &AuthState::LoggedOut);
        let notice = app.notice().unwrap();
        assert_eq!(notice.message, "Invalid credentials");
        assert_eq!(notice.kind, NoticeKind::Error);
    }

    #[test]
    fn restored_token_does_not_persist_again() {
        let now = Instant::now();
        let mut app = App::new(&identity(), AppConfig::default());

        let actions = app.handle(AppEvent::TokenRestored { token: "tok".to_string() }, now);

        assert!(matches!(actions.as_slice(), [
            AppAction::FetchHistory { .. },
            AppAction::Connect { .. },
            AppAction::Render
        ]));
        assert!(app.is_logged_in());
        assert_eq!(app.auth().user_id(), None);
    }

    #[test]
    fn initial_page_scrolls_to_bottom_after_layout() {
        let now = Instant::now();
        let (mut app, request) = logged_in(now);

        let actions = app.handle(
            AppEvent::HistoryLoaded { ticket: request.ticket, result: Ok(page(1..=20, true)) },
            now,
        );
        assert_eq!(actions, vec![AppAction::Render]);
        assert_eq!(app.timeline().len(), 20);

        let actions = app.handle(AppEvent::LayoutChanged { scroll_height: 2000 }, now);
        assert_eq!(actions, vec![AppAction::Scroll(ScrollCommand::ToBottom(
            ScrollBehavior::Instant
        ))]);
        assert_eq!(app.next_deadline(), Some(now + DEFAULT_NOTICE_TTL));
    }

    #[test]
    fn scrolling_near_top_loads_older_page() {
        let now = Instant::now();
        let (mut app, request) = logged_in(now);
        let _ = app.handle(
            AppEvent::HistoryLoaded { ticket: request.ticket, result: Ok(page(21..=40, true)) },
            now,
        );

        let actions = app.handle(AppEvent::Scrolled(ViewportGeometry::new(40, 2000, 500)), now);
        let older = fetch_request(&actions);
        assert_eq!(older.before.as_deref(), Some("21"));
        assert!(app.is_loading_more());

        // Only one fetch at a time.
        let actions = app.handle(AppEvent::Scrolled(ViewportGeometry::new(10, 2000, 500)), now);
        assert_eq!(actions, vec![AppAction::Render]);

        let _ = app.handle(
            AppEvent::HistoryLoaded { ticket: older.ticket, result: Ok(page(1..=20, false)) },
            now,
        );
        assert_eq!(app.timeline().len(), 40);
        assert!(!app.is_loading_more());

        let actions = app.handle(AppEvent::LayoutChanged { scroll_height: 4000 }, now);
        assert_eq!(actions, vec![AppAction::Scroll(ScrollCommand::To { top: 2040 })]);
    }

    #[test]
    fn fetch_times_out_and_late_result_is_ignored() {
        let now = Instant::now();
        let (mut app, request) = logged_in(now);

        assert!(app.handle(AppEvent::Tick, now + Duration::from_secs(3)).is_empty());

        let later = now + DEFAULT_FETCH_TIMEOUT;
        let actions = app.handle(AppEvent::Tick, later);
        assert_eq!(actions, vec![
            AppAction::CancelFetch { ticket: request.ticket },
            AppAction::Render
        ]);
        assert_eq!(app.notice().map(|n| n.message.as_str()), Some("Failed to fetch messages"));

        let actions = app.handle(
            AppEvent::HistoryLoaded { ticket: request.ticket, result: Ok(page(1..=3, false)) },
            later,
        );
        assert!(actions.is_empty());
        assert!(app.timeline().is_empty());
    }

    #[test]
    fn notice_expires() {
        let now = Instant::now();
        let (mut app, request) = logged_in(now);
        let _ = app.handle(
            AppEvent::HistoryLoaded { ticket: request.ticket, result: Ok(page(1..=3, false)) },
            now,
        );
        assert!(app.notice().is_some());

        assert!(app.handle(AppEvent::Tick, now + Duration::from_secs(4)).is_empty());
        let actions = app.handle(AppEvent::Tick, now + DEFAULT_NOTICE_TTL);
        assert_eq!(actions, vec![AppAction::Render]);
        assert!(app.notice().is_none());
        assert_eq!(app.next_deadline(), None);
    }

    #[test]
    fn logout_cancels_fetch_and_clears_timeline() {
        let now = Instant::now();
        let (mut app, request) = logged_in(now);
        let _ = app.handle(AppEvent::MessageReceived(message(50, 1)), now);

        let actions = app.handle(AppEvent::Logout, now);

        assert_eq!(actions, vec![
            AppAction::CancelFetch { ticket: request.ticket },
            AppAction::Disconnect,
            AppAction::ForgetToken,
            AppAction::Render
        ]);
        assert!(app.timeline().is_empty());
        assert!(!app.is_logged_in());
        assert_eq!(app.notice().map(|n| n.kind), Some(NoticeKind::Info));

        // Results and live messages after logout are dropped.
        let actions = app.handle(
            AppEvent::HistoryLoaded { ticket: request.ticket, result: Ok(page(1..=3, false)) },
            now,
        );
        assert!(actions.is_empty());
        assert!(app.handle(AppEvent::MessageReceived(message(51, 1)), now).is_empty());
        assert!(app.timeline().is_empty());
    }

    #[test]
    fn send_requires_login_and_content() {
        let now = Instant::now();
        let mut app = App::new(&identity(), AppConfig::default());
        let actions =
            app.handle(AppEvent::Send { body: "hi".to_string(), attachments: Vec::new() }, now);
        assert_eq!(actions, vec![AppAction::Render]);
        assert_eq!(app.notice().map(|n| n.kind), Some(NoticeKind::Error));

        let (mut app, _) = logged_in(now);
        let actions =
            app.handle(AppEvent::Send { body: "  ".to_string(), attachments: Vec::new() }, now);
        assert!(actions.is_empty());

        let actions =
            app.handle(AppEvent::Send { body: "hi".to_string(), attachments: Vec::new() }, now);
        assert!(matches!(actions.as_slice(), [AppAction::SendMessage { .. }, AppAction::Render]));
        assert!(app.is_sending());

        let _ = app.handle(AppEvent::SendCompleted { result: Err(String::new()) }, now);
        assert!(!app.is_sending());
        assert_eq!(app.notice().map(|n| n.message.as_str()), Some("Failed to send message"));
    }

    #[test]
    fn unread_counts_while_scrolled_away() {
        let now = Instant::now();
        let (mut app, request) = logged_in(now);
        let _ = app.handle(
            AppEvent::HistoryLoaded { ticket: request.ticket, result: Ok(page(1..=20, false)) },
            now,
        );
        let _ = app.handle(AppEvent::LayoutChanged { scroll_height: 2000 }, now);

        let _ = app.handle(AppEvent::Scrolled(ViewportGeometry::new(800, 2000, 500)), now);
        let _ = app.handle(AppEvent::MessageReceived(message(21, 1)), now);
        let _ = app.handle(AppEvent::MessageReceived(message(22, 1)), now);
        assert_eq!(app.read_state().unread_count, 2);
        assert!(app.handle(AppEvent::LayoutChanged { scroll_height: 2200 }, now).is_empty());

        let actions = app.handle(AppEvent::JumpToBottom, now);
        assert_eq!(actions[0], AppAction::Scroll(ScrollCommand::ToBottom(ScrollBehavior::Smooth)));
        assert_eq!(app.read_state().unread_count, 0);
        assert_eq!(
            app.read_state().last_read_timestamp.as_deref(),
            Some("2024-05-01T10:00:00Z")
        );
    }

    #[test]
    fn batch_size_applies_to_next_fetch() {
        let now = Instant::now();
        let mut app = App::new(&identity(), AppConfig::default());
        let _ = app.handle(AppEvent::BatchSizeChanged(BatchSize::Fifty), now);

        let actions = app.handle(AppEvent::TokenRestored { token: "tok".to_string() }, now);

        assert_eq!(fetch_request(&actions).limit, 50);
        assert_eq!(app.batch_size(), BatchSize::Fifty);
    }

    #[test]
    fn entries_flag_day_breaks_and_own_messages() {
        let now = Instant::now();
        let (mut app, request) = logged_in(now);
        let history =
            MessagePage { messages: vec![message(1, 1), message(2, 1)], ..MessagePage::empty() };
        let _ = app.handle(AppEvent::HistoryLoaded { ticket: request.ticket, result: Ok(history) }, now);
        let _ = app.handle(AppEvent::MessageReceived(message(3, 2)), now);

        let flags: Vec<(u64, bool, bool)> =
            app.entries().map(|e| (e.message.id, e.starts_new_day, e.is_own)).collect();

        assert_eq!(flags, vec![(1, true, false), (2, false, true), (3, true, false)]);
    }
}

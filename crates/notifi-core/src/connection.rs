//! Live-channel state machine.
//!
//! Owns the lifecycle of the duplex channel: connect, detect failure, wait,
//! reconnect. Uses the action pattern: methods take time as input and return
//! actions for the driver to execute. The driver owns the socket; this type
//! only decides when to open and close it.
//!
//! # State Machine
//!
//! ```text
//!                 connect()            on_open
//! ┌──────────────┐─────────>┌────────────┐────────>┌───────────┐
//! │ Disconnected │          │ Connecting │         │ Connected │
//! └──────────────┘<─────────└────────────┘         └───────────┘
//!        ↑         on_error / timeout                    │
//!        └───────────────────────────────────────────────┘
//!                              on_close(code)
//! ```
//!
//! Every channel the machine asks the driver to open gets a fresh
//! [`ChannelId`]. Events carry that id back; events from any channel other
//! than the current one are rejected as stale, so a late close from a replaced
//! socket never disturbs its successor.

use std::{
    fmt,
    ops::{Add, Sub},
    time::{Duration, Instant},
};

use notifi_proto::{CloseCode, Message};
use tracing::{debug, error, info, warn};

use crate::{error::ConnectionError, identity::DeviceId};

/// Delay between an abnormal close and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Time a channel may stay in `Connecting` before it is abandoned.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifier of one channel instance opened by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection state. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No channel, possibly waiting for the reconnect timer
    Disconnected,
    /// Channel requested, waiting for the open event
    Connecting,
    /// Channel open, messages flowing
    Connected,
}

impl ConnectionState {
    /// Whether `self -> next` is in the transition table.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected)
                | (Self::Connecting, Self::Disconnected)
                | (Self::Connected, Self::Disconnected)
        )
    }
}

/// Delay schedule for reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay after every failure
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`
    Exponential {
        /// Delay after the first failure
        base: Duration,
        /// Upper bound on any delay
        max: Duration,
    },
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (0 after the first failure).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            },
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

/// Connection configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Delay schedule after abnormal closes and failed attempts
    pub reconnect: ReconnectPolicy,
    /// Time allowed in `Connecting` before the attempt is abandoned
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { reconnect: ReconnectPolicy::default(), connect_timeout: DEFAULT_CONNECT_TIMEOUT }
    }
}

/// Actions returned by the connection state machine.
///
/// The driver executes these in order:
/// - `Open`: start a new channel for `/ws/messages?deviceId=..&token=..`
/// - `Close`: close a channel with a close frame
/// - `Abandon`: drop a channel that never finished opening
/// - `ConnectionChanged`: notify the connection-change listener
/// - `Deliver`: hand a decoded message to the message listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a new channel
    Open {
        /// Id to tag every event of this channel with
        channel: ChannelId,
        /// Bearer token embedded in the connection parameters
        token: String,
        /// Device id embedded in the connection parameters
        device_id: DeviceId,
    },

    /// Close a channel
    Close {
        /// Channel to close
        channel: ChannelId,
        /// Close code to send
        code: CloseCode,
        /// Human-readable reason
        reason: String,
    },

    /// Drop a channel without a closing handshake
    Abandon {
        /// Channel to drop
        channel: ChannelId,
    },

    /// Transition into or out of `Connected`
    ConnectionChanged {
        /// New state
        connected: bool,
    },

    /// Decoded inbound message
    Deliver(Message),
}

/// Live-channel state machine.
///
/// Pure: no I/O, no environment. Generic over `Instant` so the harness can
/// drive it with virtual time.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    device_id: DeviceId,
    /// Token used for the current and future attempts. `None` after shutdown.
    token: Option<String>,
    /// Channel currently `Connecting` or `Connected`
    channel: Option<ChannelId>,
    next_channel: u64,
    connecting_since: Option<I>,
    /// The single pending reconnect timer
    reconnect_at: Option<I>,
    /// Consecutive failures since the last successful open
    failures: u32,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    /// Create a disconnected connection bound to `device_id`.
    ///
    /// The device id is fixed for the lifetime of the connection.
    pub fn new(device_id: DeviceId, config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            device_id,
            token: None,
            channel: None,
            next_channel: 1,
            connecting_since: None,
            reconnect_at: None,
            failures: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the channel is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Device id presented on every connect.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Current channel, if `Connecting` or `Connected`.
    #[must_use]
    pub fn current_channel(&self) -> Option<ChannelId> {
        self.channel
    }

    /// When the pending reconnect fires. `None` if no timer is pending.
    #[must_use]
    pub fn reconnect_deadline(&self) -> Option<I> {
        self.reconnect_at
    }

    /// Earliest instant at which [`Self::tick`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<I> {
        let timeout = self.connecting_since.map(|since| since + self.config.connect_timeout);
        match (self.reconnect_at, timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Start connecting with `token`.
    ///
    /// Idempotent: a no-op while `Connecting` or `Connected`, and when the
    /// token is empty. Cancels a pending reconnect timer.
    pub fn connect(&mut self, token: impl Into<String>, now: I) -> Vec<ConnectionAction> {
        let token = token.into();
        if token.is_empty() {
            debug!("connect ignored: no auth token");
            return Vec::new();
        }
        if self.state != ConnectionState::Disconnected {
            debug!(state = ?self.state, "connect ignored: channel already active");
            return Vec::new();
        }

        self.token = Some(token);
        self.open(now)
    }

    /// Channel finished opening.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::StaleChannel` if `channel` is not current
    /// - `ConnectionError::InvalidTransition` if not `Connecting`
    pub fn handle_open(
        &mut self,
        channel: ChannelId,
        _now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.ensure_current(channel)?;
        self.transition(ConnectionState::Connected)?;

        self.connecting_since = None;
        self.failures = 0;
        info!(channel = %channel, device_id = %self.device_id, "live channel open");

        Ok(vec![ConnectionAction::ConnectionChanged { connected: true }])
    }

    /// Inbound text frame.
    ///
    /// Undecodable frames are logged and dropped; the channel stays open.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::StaleChannel` if `channel` is not current
    /// - `ConnectionError::UnexpectedEvent` if not `Connected`
    pub fn handle_text(
        &mut self,
        channel: ChannelId,
        text: &str,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.ensure_current(channel)?;
        if self.state != ConnectionState::Connected {
            return Err(ConnectionError::UnexpectedEvent { state: self.state, event: "message" });
        }

        match Message::decode(text) {
            Ok(message) => Ok(vec![ConnectionAction::Deliver(message)]),
            Err(e) => {
                error!(channel = %channel, error = %e, "dropping malformed frame");
                Ok(Vec::new())
            },
        }
    }

    /// Channel closed with `code`.
    ///
    /// Codes other than normal closure and going-away schedule a reconnect,
    /// replacing any pending timer.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::StaleChannel` if `channel` is not current
    pub fn handle_close(
        &mut self,
        channel: ChannelId,
        code: CloseCode,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.ensure_current(channel)?;

        let was_connected = self.is_connected();
        self.transition(ConnectionState::Disconnected)?;
        self.channel = None;
        self.connecting_since = None;

        let mut actions = Vec::new();
        if was_connected {
            actions.push(ConnectionAction::ConnectionChanged { connected: false });
        }

        if code.is_intentional() {
            info!(channel = %channel, code = %code, "live channel closed");
        } else {
            warn!(channel = %channel, code = %code, "live channel closed abnormally");
            self.schedule_reconnect(now);
        }

        Ok(actions)
    }

    /// Transport error on `channel`.
    ///
    /// While `Connecting` the attempt has failed: the channel is abandoned and
    /// a reconnect scheduled. While `Connected` the error is only logged; the
    /// close event that follows drives the transition.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::StaleChannel` if `channel` is not current
    pub fn handle_error(
        &mut self,
        channel: ChannelId,
        reason: &str,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.ensure_current(channel)?;

        match self.state {
            ConnectionState::Connecting => {
                warn!(channel = %channel, reason, "connect attempt failed");
                Ok(self.fail_attempt(channel, now))
            },
            _ => {
                warn!(channel = %channel, reason, "live channel error");
                Ok(Vec::new())
            },
        }
    }

    /// Fire due timers: the reconnect timer and the connect timeout.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Connecting
            && let (Some(since), Some(channel)) = (self.connecting_since, self.channel)
            && now - since >= self.config.connect_timeout
        {
            warn!(channel = %channel, elapsed = ?(now - since), "connect attempt timed out");
            return self.fail_attempt(channel, now);
        }

        match self.reconnect_at {
            Some(at) if now >= at => {
                self.reconnect_at = None;
                if self.state == ConnectionState::Disconnected {
                    debug!("reconnect timer fired");
                    self.open(now)
                } else {
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }

    /// Host visibility changed.
    ///
    /// Regaining visibility while disconnected reconnects immediately,
    /// regardless of the timer.
    pub fn handle_visibility(&mut self, visible: bool, now: I) -> Vec<ConnectionAction> {
        if !visible || self.state != ConnectionState::Disconnected || self.token.is_none() {
            return Vec::new();
        }

        info!("visible again while disconnected, reconnecting now");
        self.open(now)
    }

    /// Replace the auth token.
    ///
    /// Forces a full reconnect: the current channel is closed normally and a
    /// new one opened with the new token. An empty token shuts down.
    pub fn rotate_token(&mut self, token: impl Into<String>, now: I) -> Vec<ConnectionAction> {
        let token = token.into();
        if token.is_empty() {
            return self.shutdown();
        }
        if self.token.as_deref() == Some(token.as_str()) {
            return Vec::new();
        }

        info!("auth token changed, reconnecting");
        let mut actions = self.release_channel("token rotated");
        self.token = Some(token);
        self.failures = 0;
        actions.extend(self.open(now));
        actions
    }

    /// Intentional teardown.
    ///
    /// Closes with the normal code, forgets the token and cancels the timer.
    pub fn shutdown(&mut self) -> Vec<ConnectionAction> {
        self.token = None;
        self.reconnect_at = None;
        self.failures = 0;

        let actions = self.release_channel("client shutdown");
        info!("live channel shut down");
        actions
    }

    fn open(&mut self, now: I) -> Vec<ConnectionAction> {
        let Some(token) = self.token.clone() else {
            return Vec::new();
        };
        if let Err(e) = self.transition(ConnectionState::Connecting) {
            warn!(error = %e, "cannot open channel");
            return Vec::new();
        }

        if self.reconnect_at.take().is_some() {
            debug!("pending reconnect timer cancelled");
        }

        let channel = ChannelId(self.next_channel);
        self.next_channel += 1;
        self.channel = Some(channel);
        self.connecting_since = Some(now);

        info!(channel = %channel, device_id = %self.device_id, "opening live channel");
        vec![ConnectionAction::Open { channel, token, device_id: self.device_id.clone() }]
    }

    fn fail_attempt(&mut self, channel: ChannelId, now: I) -> Vec<ConnectionAction> {
        self.channel = None;
        self.connecting_since = None;
        if let Err(e) = self.transition(ConnectionState::Disconnected) {
            warn!(error = %e, "failed attempt from unexpected state");
        }
        self.schedule_reconnect(now);
        vec![ConnectionAction::Abandon { channel }]
    }

    /// Close the current channel normally, if any.
    fn release_channel(&mut self, reason: &str) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        let was_connected = self.is_connected();

        if let Some(channel) = self.channel.take() {
            actions.push(ConnectionAction::Close {
                channel,
                code: CloseCode::NORMAL,
                reason: reason.to_string(),
            });
        }
        if self.state != ConnectionState::Disconnected
            && let Err(e) = self.transition(ConnectionState::Disconnected)
        {
            warn!(error = %e, "cannot release channel");
        }
        self.connecting_since = None;

        if was_connected {
            actions.push(ConnectionAction::ConnectionChanged { connected: false });
        }
        actions
    }

    fn schedule_reconnect(&mut self, now: I) {
        if self.token.is_none() {
            return;
        }

        let delay = self.config.reconnect.delay(self.failures);
        self.failures = self.failures.saturating_add(1);

        if self.reconnect_at.replace(now + delay).is_some() {
            debug!("replacing pending reconnect timer");
        }
        info!(delay = ?delay, "reconnect scheduled");
    }

    fn ensure_current(&self, channel: ChannelId) -> Result<(), ConnectionError> {
        if self.channel == Some(channel) {
            Ok(())
        } else {
            Err(ConnectionError::StaleChannel { channel })
        }
    }

    fn transition(&mut self, next: ConnectionState) -> Result<(), ConnectionError> {
        if !self.state.can_transition_to(next) {
            return Err(ConnectionError::InvalidTransition { from: self.state, to: next });
        }
        debug!(from = ?self.state, to = ?next, "connection state transition");
        self.state = next;
        Ok(())
    }
}

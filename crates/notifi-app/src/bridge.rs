//! Live-channel to application translation layer.
//!
//! The [`Bridge`] wraps the [`notifi_core::Connection`] state machine and
//! adapts it to the application lifecycle.
//!
//! # Responsibilities
//!
//! - Converts [`crate::AppAction::Connect`] and [`crate::AppAction::Disconnect`]
//!   into connection operations.
//! - Accumulates outgoing [`ChannelCommand`]s to be executed by the driver in
//!   the next I/O cycle.
//! - Interprets channel events and converts the results back into
//!   [`crate::AppEvent`]s, invoking the registered listeners on the way.
//! - Manages time ticks generically to support both real-time execution and
//!   deterministic simulation.

use notifi_core::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionError, ConnectionState,
    Environment, Identity,
};
use notifi_proto::Message;
use tracing::{debug, warn};

use crate::{AppAction, AppEvent, ChannelCommand, ChannelEvent};

type MessageHandler = Box<dyn FnMut(&Message) + Send>;
type ConnectionHandler = Box<dyn FnMut(bool) + Send>;

/// Bridge between App and the live channel.
///
/// Generic over Environment to support both production and simulation.
/// The Instant type is determined by the Environment's associated type.
pub struct Bridge<E: Environment> {
    env: E,
    identity: Identity,
    connection: Connection<E::Instant>,
    outgoing: Vec<ChannelCommand>,
    on_message: Option<MessageHandler>,
    on_connection_change: Option<ConnectionHandler>,
}

impl<E: Environment> Bridge<E> {
    /// Create a disconnected Bridge for `identity`.
    pub fn new(env: E, identity: Identity, config: ConnectionConfig) -> Self {
        let connection = Connection::new(identity.device_id(), config);
        Self {
            env,
            identity,
            connection,
            outgoing: Vec::new(),
            on_message: None,
            on_connection_change: None,
        }
    }

    /// Register the message listener. Replaces any previous one.
    pub fn on_message(&mut self, handler: impl FnMut(&Message) + Send + 'static) {
        self.on_message = Some(Box::new(handler));
    }

    /// Register the connection-change listener. Replaces any previous one.
    pub fn on_connection_change(&mut self, handler: impl FnMut(bool) + Send + 'static) {
        self.on_connection_change = Some(Box::new(handler));
    }

    /// Identity this client connects as.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Live channel is open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Process an App action and return resulting App events.
    ///
    /// Only connection actions concern the bridge; everything else is
    /// executed by the driver.
    pub fn process_app_action(&mut self, action: &AppAction) -> Vec<AppEvent> {
        let now = self.env.now();
        let actions = match action {
            AppAction::Connect { token } => {
                if self.connection.state() == ConnectionState::Disconnected {
                    self.connection.connect(token.as_str(), now)
                } else {
                    self.connection.rotate_token(token.as_str(), now)
                }
            },
            AppAction::Disconnect => self.connection.shutdown(),
            _ => return Vec::new(),
        };
        self.process_connection_actions(actions)
    }

    /// Handle an event reported by the driver's channel layer.
    pub fn handle_channel_event(&mut self, event: ChannelEvent) -> Vec<AppEvent> {
        let now = self.env.now();
        let result = match event {
            ChannelEvent::Opened { channel } => self.connection.handle_open(channel, now),
            ChannelEvent::Text { channel, text } => self.connection.handle_text(channel, &text),
            ChannelEvent::Closed { channel, code } => {
                self.connection.handle_close(channel, code, now)
            },
            ChannelEvent::Failed { channel, reason } => {
                self.connection.handle_error(channel, &reason, now)
            },
        };
        self.handle_connection_result(result)
    }

    /// Host visibility changed.
    pub fn handle_visibility(&mut self, visible: bool) -> Vec<AppEvent> {
        let actions = self.connection.handle_visibility(visible, self.env.now());
        self.process_connection_actions(actions)
    }

    /// Process a time tick.
    pub fn handle_tick(&mut self, now: E::Instant) -> Vec<AppEvent> {
        let actions = self.connection.tick(now);
        self.process_connection_actions(actions)
    }

    /// Earliest instant at which [`Self::handle_tick`] has work to do.
    pub fn next_deadline(&self) -> Option<E::Instant> {
        self.connection.next_deadline()
    }

    /// Take pending channel commands.
    pub fn take_outgoing(&mut self) -> Vec<ChannelCommand> {
        std::mem::take(&mut self.outgoing)
    }

    fn handle_connection_result(
        &mut self,
        result: Result<Vec<ConnectionAction>, ConnectionError>,
    ) -> Vec<AppEvent> {
        match result {
            Ok(actions) => self.process_connection_actions(actions),
            Err(e) if e.is_stale() => {
                debug!(error = %e, "ignoring event from replaced channel");
                Vec::new()
            },
            Err(e) => {
                warn!(error = %e, "unexpected channel event");
                Vec::new()
            },
        }
    }

    fn process_connection_actions(&mut self, actions: Vec<ConnectionAction>) -> Vec<AppEvent> {
        let mut events = Vec::new();

        for action in actions {
            match action {
                ConnectionAction::Open { channel, token, device_id } => {
                    self.outgoing.push(ChannelCommand::Open { channel, token, device_id });
                },
                ConnectionAction::Close { channel, code, reason } => {
                    self.outgoing.push(ChannelCommand::Close { channel, code, reason });
                },
                ConnectionAction::Abandon { channel } => {
                    self.outgoing.push(ChannelCommand::Abandon { channel });
                },
                ConnectionAction::ConnectionChanged { connected } => {
                    if let Some(handler) = self.on_connection_change.as_mut() {
                        handler(connected);
                    }
                    events.push(AppEvent::ConnectionChanged { connected });
                },
                ConnectionAction::Deliver(message) => {
                    if let Some(handler) = self.on_message.as_mut() {
                        handler(&message);
                    }
                    events.push(AppEvent::MessageReceived(message));
                },
            }
        }

        events
    }
}

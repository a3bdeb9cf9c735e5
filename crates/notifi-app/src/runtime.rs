//! Generic runtime for application orchestration.
//!
//! The Runtime drives the application event loop, coordinating between:
//! - [`App`]: UI state machine
//! - [`Bridge`]: Live-channel bridge to Connection
//! - [`Driver`]: Platform-specific I/O

use notifi_core::{ConnectionConfig, Environment, Identity};
use tracing::warn;

use crate::{App, AppAction, AppConfig, AppEvent, Bridge, Driver, Input};

/// Generic runtime that orchestrates App, Bridge, and Driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment for time and randomness
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    app: App<E::Instant>,
    bridge: Bridge<E>,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Create a new runtime with the given driver and environment.
    pub fn new(
        driver: D,
        env: E,
        identity: Identity,
        connection: ConnectionConfig,
        config: AppConfig,
    ) -> Self {
        let app = App::new(&identity, config);
        let bridge = Bridge::new(env, identity, connection);
        Self { driver, app, bridge }
    }

    /// Run the main event loop until the App quits.
    ///
    /// This is the core orchestration loop that:
    /// 1. Waits for input from the driver, bounded by the next timer deadline
    /// 2. Routes it to the App or the Bridge
    /// 3. Fires due timers on both
    /// 4. Executes resulting actions and channel commands through the driver
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(&mut self, restored_token: Option<String>) -> Result<(), D::Error> {
        let mut quit = self.start(restored_token)?;
        while !quit {
            quit = self.step().await?;
        }
        self.shutdown();
        Ok(())
    }

    /// Render the initial state and resume a stored session.
    ///
    /// Returns `true` if the application should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub fn start(&mut self, restored_token: Option<String>) -> Result<bool, D::Error> {
        self.driver.render(&self.app)?;
        match restored_token {
            Some(token) => self.dispatch(AppEvent::TokenRestored { token }),
            None => Ok(false),
        }
    }

    /// Process one cycle of the event loop.
    ///
    /// Returns `true` if the application should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn step(&mut self) -> Result<bool, D::Error> {
        let deadline = self.next_deadline();
        let quit = match self.driver.next_input(deadline).await? {
            Some(Input::App(event)) => self.dispatch(event)?,
            Some(Input::Channel(event)) => {
                let events = self.bridge.handle_channel_event(event);
                self.process_bridge_events(events)?
            },
            Some(Input::Visibility(visible)) => {
                let events = self.bridge.handle_visibility(visible);
                self.process_bridge_events(events)?
            },
            None => false,
        };
        if quit {
            return Ok(true);
        }

        let now = self.driver.now();
        let events = self.bridge.handle_tick(now);
        if self.process_bridge_events(events)? {
            return Ok(true);
        }
        let actions = self.app.handle(AppEvent::Tick, now);
        self.process_actions(actions)
    }

    /// Close the live channel and stop the driver.
    pub fn shutdown(&mut self) {
        let events = self.bridge.process_app_action(&AppAction::Disconnect);
        self.flush_channel();
        let now = self.driver.now();
        for event in events {
            // Nothing is rendered once stopping
            let _ = self.app.handle(event, now);
        }
        self.driver.stop();
    }

    /// Feed one event to the App and execute the resulting actions.
    ///
    /// Returns `true` if the application should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub fn dispatch(&mut self, event: AppEvent) -> Result<bool, D::Error> {
        let actions = self.app.handle(event, self.driver.now());
        self.process_actions(actions)
    }

    /// Earliest timer deadline of the App and the Bridge.
    pub fn next_deadline(&self) -> Option<E::Instant> {
        match (self.app.next_deadline(), self.bridge.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Process actions returned by the App.
    ///
    /// Returns `true` if should quit.
    fn process_actions(&mut self, initial_actions: Vec<AppAction>) -> Result<bool, D::Error> {
        let mut pending_actions = initial_actions;

        while !pending_actions.is_empty() {
            let actions = std::mem::take(&mut pending_actions);

            for action in actions {
                match action {
                    AppAction::Render => self.driver.render(&self.app)?,
                    AppAction::Quit => return Ok(true),
                    AppAction::Scroll(command) => self.driver.scroll(command),
                    AppAction::Authenticate { mode, credentials } => {
                        self.driver.authenticate(mode, credentials);
                    },
                    AppAction::PersistToken { token } => self.persist_token(Some(&token)),
                    AppAction::ForgetToken => self.persist_token(None),
                    AppAction::FetchHistory { token, request } => {
                        self.driver.fetch_history(&token, request);
                    },
                    AppAction::CancelFetch { ticket } => self.driver.cancel_fetch(ticket),
                    AppAction::SendMessage { token, body, attachments } => {
                        self.driver.send_message(&token, body, attachments);
                    },

                    // Live-channel operations go through the bridge
                    AppAction::Connect { .. } | AppAction::Disconnect => {
                        let events = self.bridge.process_app_action(&action);
                        self.flush_channel();
                        let now = self.driver.now();
                        for event in events {
                            pending_actions.extend(self.app.handle(event, now));
                        }
                    },
                }
            }
        }
        Ok(false)
    }

    /// Process events from Bridge back to App.
    fn process_bridge_events(&mut self, events: Vec<AppEvent>) -> Result<bool, D::Error> {
        self.flush_channel();
        for event in events {
            if self.dispatch(event)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Hand all pending channel commands to the driver.
    fn flush_channel(&mut self) {
        for command in self.bridge.take_outgoing() {
            self.driver.channel(command);
        }
    }

    fn persist_token(&mut self, token: Option<&str>) {
        if let Err(e) = self.driver.persist_token(token) {
            warn!(error = %e, "failed to persist token");
        }
    }

    /// Get a reference to the App
    pub fn app(&self) -> &App<E::Instant> {
        &self.app
    }

    /// Get a mutable reference to the App
    pub fn app_mut(&mut self) -> &mut App<E::Instant> {
        &mut self.app
    }

    /// Get a reference to the Bridge
    pub fn bridge(&self) -> &Bridge<E> {
        &self.bridge
    }

    /// Get a mutable reference to the Bridge
    pub fn bridge_mut(&mut self) -> &mut Bridge<E> {
        &mut self.bridge
    }

    /// Get a reference to the Driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get a mutable reference to the Driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

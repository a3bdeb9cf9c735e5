//! One simulated client wired through the real runtime.
//!
//! [`Simulation`] owns a [`Runtime`] over a [`SimDriver`] and a [`SimEnv`]
//! and checks the standard invariants after every step. Tests inject user
//! actions and server behaviour, then [`Simulation::settle`] or
//! [`Simulation::advance`] virtual time.

use std::time::Duration;

use notifi_app::{App, AppConfig, AppEvent, Bridge, Runtime};
use notifi_core::{ConnectionConfig, HostInfo, Identity, MemorySessionStore};
use tokio::time::Instant;

use crate::{
    SimDriver, SimEnv,
    invariants::{ClientSnapshot, InvariantRegistry, SystemSnapshot},
    sim_driver::SimDriverError,
    sim_server::SharedSimServer,
};

/// User agent every simulated client reports.
pub const SIM_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Steps after which [`Simulation::settle`] gives up.
const MAX_SETTLE_STEPS: usize = 10_000;

/// A simulated client.
pub struct Simulation {
    runtime: Runtime<SimDriver, SimEnv>,
    registry: InvariantRegistry,
    quit: bool,
}

impl Simulation {
    /// Client with default configuration.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(seed: u64, server: SharedSimServer) -> Self {
        Self::with_config(seed, server, ConnectionConfig::default(), AppConfig::default())
    }

    /// Client with explicit configuration.
    ///
    /// Must be called within a tokio runtime.
    pub fn with_config(
        seed: u64,
        server: SharedSimServer,
        connection: ConnectionConfig,
        config: AppConfig,
    ) -> Self {
        let env = SimEnv::with_seed(seed);
        let host = HostInfo::new("linux", SIM_USER_AGENT);
        let identity = Identity::create(&env, &host, &mut MemorySessionStore::new());
        let runtime = Runtime::new(SimDriver::new(server), env, identity, connection, config);
        Self { runtime, registry: InvariantRegistry::standard(), quit: false }
    }

    /// Render and resume `restored_token`, then settle.
    pub async fn start(&mut self, restored_token: Option<String>) -> Result<(), SimDriverError> {
        self.quit = self.runtime.start(restored_token)?;
        self.check("after start");
        self.settle().await
    }

    /// Queue a user action.
    pub fn inject(&self, event: AppEvent) {
        self.driver().inject_event(event);
    }

    /// Process queued inputs until none are left.
    pub async fn settle(&mut self) -> Result<(), SimDriverError> {
        let mut steps = 0;
        while !self.quit && self.driver().has_pending() {
            steps += 1;
            if steps > MAX_SETTLE_STEPS {
                return Err(SimDriverError(format!("no quiescence after {MAX_SETTLE_STEPS} steps")));
            }
            self.quit = self.runtime.step().await?;
            self.check("after step");
        }
        Ok(())
    }

    /// Let `duration` of virtual time pass, firing every timer due in it.
    pub async fn advance(&mut self, duration: Duration) -> Result<(), SimDriverError> {
        let target = Instant::now() + duration;
        loop {
            self.settle().await?;
            if self.quit {
                break;
            }
            match self.runtime.next_deadline() {
                Some(deadline) if deadline <= target => {
                    self.quit = self.runtime.step().await?;
                    self.check("after timer");
                },
                _ => break,
            }
        }
        tokio::time::sleep_until(target).await;
        Ok(())
    }

    /// Close the live channel and stop the driver.
    pub fn shutdown(&mut self) {
        self.runtime.shutdown();
        self.check("after shutdown");
    }

    /// Whether the client asked to quit.
    pub fn has_quit(&self) -> bool {
        self.quit
    }

    /// Observable state of this client.
    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot::capture(
            self.runtime.app(),
            self.runtime.bridge(),
            self.driver().open_channels(),
        )
    }

    /// Assert the standard invariants.
    pub fn check(&self, context: &str) {
        self.registry.assert_all(&SystemSnapshot::single(self.snapshot()), context);
    }

    /// Application state.
    pub fn app(&self) -> &App<Instant> {
        self.runtime.app()
    }

    /// Live-channel bridge.
    pub fn bridge(&self) -> &Bridge<SimEnv> {
        self.runtime.bridge()
    }

    /// Simulated driver.
    pub fn driver(&self) -> &SimDriver {
        self.runtime.driver()
    }
}

//! Deterministic simulation harness for the Notifi client.
//!
//! Runs the real [`notifi_app::Runtime`] against an in-memory server with
//! virtual time and seeded randomness, so reconnect timing, pagination races
//! and live/history interleavings are reproducible.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. [`Simulation`] checks
//! [`InvariantRegistry::standard()`] after every step.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_server;
pub mod simulation;

pub use invariants::{
    ClientSnapshot, ConnectionStatusAgrees, DistinctDeviceIds, Invariant, InvariantRegistry,
    InvariantResult, LoggedOutIsQuiet, SingleLiveChannel, SystemSnapshot, TimelineOrdering,
    UnreadClearedAtBottom, Violation,
};
pub use sim_driver::{SimDriver, SimDriverError};
pub use sim_env::SimEnv;
pub use sim_server::{SharedSimServer, SimServer, create_shared_server};
pub use simulation::Simulation;

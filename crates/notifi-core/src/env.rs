//! Environment abstraction for deterministic testing.
//!
//! Decouples client logic from system resources (time, randomness). The same
//! state machines run against real system resources in the binary and against
//! a virtual clock with a seeded RNG in simulation.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

/// Monotonic instant usable as virtual or real time.
///
/// Blanket-implemented for every type with the required arithmetic, so both
/// `std::time::Instant` and `tokio::time::Instant` qualify.
pub trait MonotonicInstant:
    Copy + Ord + Send + Sync + std::fmt::Debug + Sub<Output = Duration> + Add<Duration, Output = Self>
{
}

impl<T> MonotonicInstant for T where
    T: Copy + Ord + Send + Sync + std::fmt::Debug + Sub<Output = Duration> + Add<Duration, Output = T>
{
}

/// Abstract environment providing time, randomness, and async sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - Given the same seed, a simulated environment produces the same random
///   sequence
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type used by this environment.
    ///
    /// Production uses `std::time::Instant`, simulation uses virtual time
    /// (`tokio::time::Instant` with a paused clock).
    type Instant: MonotonicInstant;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code sleeps; state machines take time as input.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Wall-clock milliseconds since the Unix epoch.
    ///
    /// Only used for human-meaningful identifiers, never for ordering.
    fn wall_clock_millis(&self) -> u64;

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

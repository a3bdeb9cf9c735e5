//! Simulated environment with virtual time and seeded randomness.
//!
//! Time comes from tokio's clock, so tests run with a paused clock
//! (`#[tokio::test(start_paused = true)]`) and timers fire as soon as the
//! runtime has nothing else to do. Randomness comes from a seeded `ChaCha8`
//! stream: the same seed yields the same device ids.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use notifi_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;

/// Wall clock reported at simulation start: 2024-05-01T00:00:00Z.
pub const SIM_EPOCH_MILLIS: u64 = 1_714_521_600_000;

/// Deterministic environment for simulation.
#[derive(Clone)]
pub struct SimEnv {
    seed: u64,
    rng: Arc<Mutex<ChaCha8Rng>>,
    started: Instant,
}

impl SimEnv {
    /// Environment whose randomness derives from `seed`.
    ///
    /// Must be called within a tokio runtime.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            started: Instant::now(),
        }
    }

    /// Seed this environment was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        Instant::now() - self.started
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("seed", &self.seed).finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }

    fn wall_clock_millis(&self) -> u64 {
        SIM_EPOCH_MILLIS + self.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(42);
        let b = SimEnv::with_seed(42);
        let c = SimEnv::with_seed(43);

        assert_eq!(a.random_u64(), b.random_u64());
        assert_ne!(a.random_u64(), c.random_u64());
        assert_eq!(a.seed(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeping_advances_virtual_time() {
        let env = SimEnv::with_seed(1);
        let start = env.now();
        env.sleep(Duration::from_secs(3)).await;

        assert!(env.now() - start >= Duration::from_secs(3));
        assert!(env.wall_clock_millis() >= SIM_EPOCH_MILLIS + 3_000);
    }
}

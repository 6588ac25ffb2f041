//! Random persistent-id generation.
//!
//! Stores configured with [`PidPolicy::RandomPids`](crate::engine::config::PidPolicy)
//! assign every new entity a random positive pid instead of mirroring its id.
//!
//! # Design
//!
//! - Backed by `rand`'s [`StdRng`], seeded either from entropy or from an
//!   explicit seed for reproducible pid sequences.
//! - Pids are drawn from `1..=i32::MAX` so they stay positive and fit the
//!   integer range of common record consumers.
//! - Collisions with pids already in use are retried until a free pid is
//!   found; the caller decides what "in use" means.
//!
//! # Non-goals
//!
//! - This generator is **not** meant to produce unguessable ids.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::engine::types::Pid;


/// Upper bound (inclusive) of generated pids.
pub const MAX_RANDOM_PID: Pid = i32::MAX as Pid;

/// Seedable source of random positive pids.

#[derive(Debug)]
pub struct PidGenerator {
    rng: StdRng,
}

impl PidGenerator {
    /// Creates a generator seeded from `seed`, or from entropy when `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Restarts the sequence from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Draws pids until `in_use` rejects none of them.
    ///
    /// ## Behavior
    /// Each draw is uniform over `1..=MAX_RANDOM_PID`. The loop terminates as
    /// long as fewer than `MAX_RANDOM_PID` pids are in use.

    pub fn next_pid(&mut self, in_use: impl Fn(Pid) -> bool) -> Pid {
        loop {
            let pid = self.rng.gen_range(1..=MAX_RANDOM_PID);
            if !in_use(pid) {
                return pid;
            }
            log::trace!("random pid {pid} collided, retrying");
        }
    }
}

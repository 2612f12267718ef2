//! Shared helpers for tests: a controllable clock and a seeded observation
//! generator for invariant sweeps.

use crate::model::Observation;
use crate::store::Clock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Deterministic clock for tests.
///
/// `starting_at` advances by one millisecond per reading; `frozen` always
/// returns the same instant, which forces `created_at` ties.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
    step: i64,
}

impl ManualClock {
    pub fn starting_at(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
            step: 1,
        }
    }

    pub fn frozen(at_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(at_ms)),
            step: 0,
        }
    }

    /// Jump the clock forward.
    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.fetch_add(self.step, Ordering::SeqCst)
    }
}

/// Shorthand observation constructor.
pub fn observation(email: Option<&str>, phone: Option<&str>) -> Observation {
    Observation::new(email.map(str::to_string), phone.map(str::to_string))
}

/// Generate a seeded stream of observations.
///
/// With probability `share_probability` an observation reuses an email or
/// phone already emitted, so replaying the stream produces attach and merge
/// decisions, not just fresh identities.
pub fn seeded_observations(count: u32, share_probability: f64, seed: u64) -> Vec<Observation> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut emails: Vec<String> = Vec::new();
    let mut phones: Vec<String> = Vec::new();
    let mut observations = Vec::with_capacity(count as usize);

    for i in 0..count {
        let email = if !emails.is_empty() && rng.random_bool(share_probability) {
            Some(emails[rng.random_range(0..emails.len())].clone())
        } else if rng.random_bool(0.9) {
            let fresh = format!("user_{i:06}@example.com");
            emails.push(fresh.clone());
            Some(fresh)
        } else {
            None
        };

        let phone = if !phones.is_empty() && rng.random_bool(share_probability) {
            Some(phones[rng.random_range(0..phones.len())].clone())
        } else if rng.random_bool(0.9) || email.is_none() {
            let fresh = format!("555{:07}", rng.random_range(0..10_000_000));
            phones.push(fresh.clone());
            Some(fresh)
        } else {
            None
        };

        observations.push(Observation::new(email, phone));
    }

    observations
}

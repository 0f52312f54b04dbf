//! Delay between transaction attempts.
//!
//! The delay before retry `n` (1-based) is
//! `min(initial_backoff * multiplier^(n-1), max_backoff)`. With jitter the
//! delay is drawn uniformly from `[d / 2, d]`. A retry delay suggested by the
//! store replaces the computed one but is still capped at `max_backoff`.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RetrySettings;

#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
    rng: StdRng,
}

impl Backoff {
    #[must_use]
    pub fn new(settings: &RetrySettings) -> Self {
        Self::with_rng(settings, StdRng::from_os_rng())
    }

    /// A backoff with reproducible jitter.
    #[must_use]
    pub fn with_seed(settings: &RetrySettings, seed: u64) -> Self {
        Self::with_rng(settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: &RetrySettings, rng: StdRng) -> Self {
        Self {
            initial: settings.initial_backoff,
            max: settings.max_backoff,
            multiplier: settings.multiplier,
            jitter: settings.jitter,
            rng,
        }
    }

    /// Delay before retry `retry` without jitter.
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Delay before retry `retry`, honoring a store-provided hint.
    pub fn next_delay(&mut self, retry: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.max);
        }
        let base = self.base_delay(retry);
        if self.jitter && !base.is_zero() {
            self.rng.random_range(base / 2..=base)
        } else {
            base
        }
    }
}

//! Injected latency and forced failures per RPC method.

use std::collections::VecDeque;
use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;

use crate::status::Status;

/// How long an RPC takes in the mock store, and whether it fails.
///
/// The delay is `min_delay` plus a uniformly drawn extra of up to
/// `random_delay`, applied on every call. Forced errors are handed out one per
/// call in order; a sticky error is returned on every call until removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedExecutionTime {
    min_delay: Duration,
    random_delay: Duration,
    errors: VecDeque<Status>,
    sticky: bool,
}

impl SimulatedExecutionTime {
    #[must_use]
    pub fn of_delay(delay: Duration) -> Self {
        Self::of_random_delay(delay, Duration::ZERO)
    }

    #[must_use]
    pub fn of_random_delay(min_delay: Duration, random_delay: Duration) -> Self {
        Self {
            min_delay,
            random_delay,
            ..Self::default()
        }
    }

    /// Fail the next call with `status`.
    #[must_use]
    pub fn of_exception(status: Status) -> Self {
        Self::of_exceptions(vec![status])
    }

    /// Fail the next calls with `statuses`, one each.
    #[must_use]
    pub fn of_exceptions(statuses: Vec<Status>) -> Self {
        Self {
            errors: statuses.into(),
            ..Self::default()
        }
    }

    /// Fail every call with `status`.
    #[must_use]
    pub fn of_sticky_exception(status: Status) -> Self {
        Self {
            errors: VecDeque::from([status]),
            sticky: true,
            ..Self::default()
        }
    }

    /// Add latency to an error-injecting execution time.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Delay and optional failure for the next call.
    pub(crate) fn next(&mut self, rng: &mut StdRng) -> (Duration, Option<Status>) {
        let mut delay = self.min_delay;
        if !self.random_delay.is_zero() {
            delay += rng.random_range(Duration::ZERO..=self.random_delay);
        }
        let error = if self.sticky {
            self.errors.front().cloned()
        } else {
            self.errors.pop_front()
        };
        (delay, error)
    }
}

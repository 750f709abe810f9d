//! Exponential backoff with jitter.
//!
//! [`RetryState`] tracks one retryable operation (a broker connection, a
//! subscription). After each failed attempt the caller asks
//! [`RetryState::backoff_and_sleep`] whether to try again: while attempts
//! remain it sleeps a random duration in `[0, ceiling]` ("full jitter") and
//! doubles the ceiling up to [`RetryConfig::max_backoff_ms`]; once the attempt
//! budget is spent it reports [`RetryStatus::RetriesExhausted`] without
//! sleeping.
//!
//! `max_attempts` counts attempts, not retries: an operation that keeps
//! failing is tried exactly `max_attempts` times with `max_attempts - 1`
//! sleeps in between.
//!
//! ```rust
//! use lwmqtt::retry::{Delay, RetryConfig, RetryState, RetryStatus};
//! use rand::SeedableRng;
//! use rand::rngs::SmallRng;
//!
//! struct NoDelay;
//! impl Delay for NoDelay {
//!     fn delay_ms(&mut self, _ms: u32) {}
//! }
//!
//! let config = RetryConfig { max_attempts: 2, base_backoff_ms: 100, max_backoff_ms: 1_000 };
//! let mut state = RetryState::new(config);
//! let mut rng = SmallRng::seed_from_u64(7);
//!
//! assert_eq!(state.backoff_and_sleep(&mut NoDelay, &mut rng), RetryStatus::Success);
//! assert_eq!(state.backoff_and_sleep(&mut NoDelay, &mut rng), RetryStatus::RetriesExhausted);
//! ```

use rand::RngCore;

/// Default number of attempts for a retryable operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default initial jitter ceiling in milliseconds.
pub const DEFAULT_BASE_BACKOFF_MS: u32 = 500;
/// Default upper bound of the jitter ceiling in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u32 = 5_000;

/// Blocking millisecond delay provided by the platform.
pub trait Delay {
    /// Suspend the calling task for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }
}

/// [`Delay`] backed by `std::thread::sleep`.
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

#[cfg(feature = "std")]
impl Delay for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

/// Parameters of a retryable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Jitter ceiling after the first failed attempt.
    pub base_backoff_ms: u32,
    /// Upper bound the jitter ceiling grows to.
    pub max_backoff_ms: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

/// Outcome of [`RetryState::backoff_and_sleep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStatus {
    /// The backoff delay elapsed; the caller should attempt again.
    Success,
    /// The attempt budget is spent; the operation has failed for good.
    RetriesExhausted,
}

#[cfg(feature = "defmt")]
impl defmt::Format for RetryStatus {
    fn format(&self, f: defmt::Formatter) {
        match self {
            RetryStatus::Success => defmt::write!(f, "Success"),
            RetryStatus::RetriesExhausted => defmt::write!(f, "RetriesExhausted"),
        }
    }
}

/// Progress of one retryable operation.
#[derive(Debug, Clone)]
pub struct RetryState {
    config: RetryConfig,
    attempts_done: u32,
    next_jitter_max_ms: u32,
}

impl RetryState {
    /// Start tracking a fresh operation.
    pub fn new(config: RetryConfig) -> Self {
        let mut state = Self {
            config,
            attempts_done: 0,
            next_jitter_max_ms: 0,
        };
        state.reset();
        state
    }

    /// Forget all failed attempts.
    pub fn reset(&mut self) {
        self.attempts_done = 0;
        self.next_jitter_max_ms = self.config.base_backoff_ms.min(self.config.max_backoff_ms);
    }

    /// Record a failed attempt and sleep before the next one.
    ///
    /// Returns [`RetryStatus::RetriesExhausted`] without sleeping when the
    /// failed attempt was the last one allowed.
    pub fn backoff_and_sleep<D, R>(&mut self, delay: &mut D, rng: &mut R) -> RetryStatus
    where
        D: Delay + ?Sized,
        R: RngCore + ?Sized,
    {
        self.attempts_done = self.attempts_done.saturating_add(1);
        if self.attempts_done >= self.config.max_attempts {
            return RetryStatus::RetriesExhausted;
        }

        let ceiling = self.next_jitter_max_ms;
        let jitter = match ceiling.checked_add(1) {
            Some(bound) => rng.next_u32() % bound,
            None => rng.next_u32(),
        };
        debug!(
            "Retry attempt {} of {}: backing off for {} ms.",
            self.attempts_done,
            self.config.max_attempts,
            jitter
        );
        delay.delay_ms(jitter);

        self.next_jitter_max_ms = ceiling
            .saturating_mul(2)
            .min(self.config.max_backoff_ms);
        RetryStatus::Success
    }

    /// Number of failed attempts recorded so far.
    pub fn attempts_done(&self) -> u32 {
        self.attempts_done
    }

    /// Jitter ceiling that the next backoff will use.
    pub fn next_jitter_max_ms(&self) -> u32 {
        self.next_jitter_max_ms
    }

    /// The parameters this state was created with.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[derive(Default)]
    struct RecordingDelay {
        sleeps: heapless::Vec<u32, 16>,
    }

    impl Delay for RecordingDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.sleeps.push(ms).unwrap();
        }
    }

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_backoff_ms: 100,
            max_backoff_ms: 350,
        }
    }

    #[test]
    fn test_exhausts_after_max_attempts() {
        let mut delay = RecordingDelay::default();
        let mut rng = SmallRng::seed_from_u64(1);
        let mut state = RetryState::new(config(4));

        for _ in 0..3 {
            assert_eq!(
                state.backoff_and_sleep(&mut delay, &mut rng),
                RetryStatus::Success
            );
        }
        assert_eq!(
            state.backoff_and_sleep(&mut delay, &mut rng),
            RetryStatus::RetriesExhausted
        );
        // No sleep once the budget is spent.
        assert_eq!(delay.sleeps.len(), 3);
        assert_eq!(state.attempts_done(), 4);
    }

    #[test]
    fn test_single_attempt_never_sleeps() {
        let mut delay = RecordingDelay::default();
        let mut rng = SmallRng::seed_from_u64(2);
        let mut state = RetryState::new(config(1));

        assert_eq!(
            state.backoff_and_sleep(&mut delay, &mut rng),
            RetryStatus::RetriesExhausted
        );
        assert!(delay.sleeps.is_empty());
    }

    #[test]
    fn test_ceiling_doubles_and_caps() {
        let mut delay = RecordingDelay::default();
        let mut rng = SmallRng::seed_from_u64(3);
        let mut state = RetryState::new(config(10));

        assert_eq!(state.next_jitter_max_ms(), 100);
        state.backoff_and_sleep(&mut delay, &mut rng);
        assert_eq!(state.next_jitter_max_ms(), 200);
        state.backoff_and_sleep(&mut delay, &mut rng);
        assert_eq!(state.next_jitter_max_ms(), 350);
        state.backoff_and_sleep(&mut delay, &mut rng);
        assert_eq!(state.next_jitter_max_ms(), 350);

        let ceilings = [100, 200, 350];
        for (slept, ceiling) in delay.sleeps.iter().zip(ceilings) {
            assert!(*slept <= ceiling);
        }
    }

    #[test]
    fn test_reset_restores_base_ceiling() {
        let mut delay = RecordingDelay::default();
        let mut rng = SmallRng::seed_from_u64(4);
        let mut state = RetryState::new(config(10));

        state.backoff_and_sleep(&mut delay, &mut rng);
        state.backoff_and_sleep(&mut delay, &mut rng);
        state.reset();

        assert_eq!(state.attempts_done(), 0);
        assert_eq!(state.next_jitter_max_ms(), 100);
    }
}

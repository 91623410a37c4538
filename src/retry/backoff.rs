use rand::Rng;
use std::time::Duration;

/// Strategy used to compute the pause between two attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Always wait the same amount of time.
    Fixed(Duration),
    /// Double the wait on each failure, up to `max`, then add a random jitter in `0..=jitter`.
    Exponential {
        initial: Duration,
        max: Duration,
        jitter: Duration,
    },
}

impl Backoff {
    /// Exponential backoff starting at 1 second, capped at 60 seconds, with 1 second of jitter.
    pub fn exponential_jitter() -> Self {
        Backoff::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            jitter: Duration::from_secs(1),
        }
    }

    /// Delay before the next attempt, given the number of attempts which already failed (>= 1).
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential {
                initial,
                max,
                jitter,
            } => {
                let exponent = failed_attempts.saturating_sub(1).min(31);
                let delay = initial
                    .checked_mul(1u32 << exponent)
                    .map_or(max, |d| d.min(max));

                if jitter.is_zero() {
                    delay
                } else {
                    let jitter_max = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
                    let jitter_ms = rand::rng().random_range(0..=jitter_max);
                    delay.saturating_add(Duration::from_millis(jitter_ms))
                }
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential_jitter()
    }
}

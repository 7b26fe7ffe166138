//! Inter-request pacing for site adapters.
//!
//! Each adapter pauses `rate_limit_delay` between outbound requests, with a
//! small uniform jitter so a fleet of scrapers starting together does not
//! hit sources in lockstep bursts.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Uniform jitter bound in seconds, applied as +/- around the base delay.
const JITTER_SECONDS: f64 = 0.3;

/// Sleeps between requests; cheap to clone per adapter.
#[derive(Debug, Clone)]
pub struct RequestPacer {
    delay: Duration,
}

impl RequestPacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Pause for the configured delay plus jitter. A zero delay skips the
    /// sleep entirely (fixture adapters, tests).
    pub async fn pause(&self) {
        if self.delay.is_zero() {
            return;
        }
        let jitter = rand::rng().random_range(-JITTER_SECONDS..=JITTER_SECONDS);
        let seconds = (self.delay.as_secs_f64() + jitter).max(0.0);
        sleep(Duration::from_secs_f64(seconds)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_pause_stays_within_jitter_bounds() {
        let pacer = RequestPacer::new(Duration::from_secs(2));
        let started = Instant::now();
        pacer.pause().await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs_f64(2.0 - JITTER_SECONDS));
        assert!(elapsed <= Duration::from_secs_f64(2.0 + JITTER_SECONDS + 0.001));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_does_not_sleep() {
        let pacer = RequestPacer::new(Duration::ZERO);
        let started = Instant::now();
        pacer.pause().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}

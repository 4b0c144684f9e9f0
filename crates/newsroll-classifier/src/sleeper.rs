//! Backoff waits, behind a trait so tests can skip real delays

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Delay after the `failed_attempt`-th attempt: `base * 2^(failed_attempt - 1)`, capped
pub fn backoff_delay(base: Duration, failed_attempt: u32, cap: Duration) -> Duration {
    let exponent = failed_attempt.saturating_sub(1);
    let factor = 2u32.saturating_pow(exponent);
    base.saturating_mul(factor).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(60);
        let delays: Vec<Duration> = (1..=4).map(|a| backoff_delay(base, a, cap)).collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn test_backoff_is_capped_and_monotonic() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(10);
        let delays: Vec<Duration> = (1..=40).map(|a| backoff_delay(base, a, cap)).collect();

        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), cap);
    }

    #[tokio::test]
    async fn test_tokio_sleeper_zero() {
        TokioSleeper.sleep(Duration::ZERO).await;
    }
}

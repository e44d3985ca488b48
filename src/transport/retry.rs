//! Attempt budget and backoff for coordinator requests.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per exchange; 1 disables retries.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff: Duration::from_millis(100), max_backoff: Duration::from_secs(30) }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self { Self { max_attempts: 1, ..Self::default() } }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Upper bound of the delay after `attempt` failed (1-based): `initial * 2^(attempt-1)`, capped.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Jittered delay in `[ceiling/2, ceiling]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt).as_nanos().min(u64::MAX as u128) as u64;
        let nanos = rand::thread_rng().gen_range(ceiling / 2..=ceiling);
        Duration::from_nanos(nanos)
    }
}

pub(crate) fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}

/// Run `send` until it yields a non-retryable outcome or the budget is spent.
/// A final 503 is handed back as a response so normalization reports it.
pub(crate) async fn send_with_retry<F, Fut>(policy: &RetryPolicy, method: &str, mut send: F) -> Result<reqwest::Response>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let started = Instant::now();
        let outcome = send().await;
        let reason = match &outcome {
            Ok(resp) if resp.status() == StatusCode::SERVICE_UNAVAILABLE => Some("503 service unavailable".to_string()),
            Ok(resp) => {
                debug!(target: "presto::transport", "{} {} -> {} in {:?}", method, resp.url(), resp.status(), started.elapsed());
                None
            }
            Err(e) if is_transient(e) => Some(e.to_string()),
            Err(_) => None,
        };
        match reason {
            Some(reason) if attempt < attempts => {
                let delay = policy.backoff(attempt);
                warn!(target: "presto::transport", "{} attempt {}/{} failed: {}; retrying in {:?}", method, attempt, attempts, reason, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            _ => return outcome.map_err(Error::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_grows_then_caps() {
        let p = RetryPolicy::default().with_backoff(Duration::from_millis(100), Duration::from_secs(1));
        let ceilings: Vec<_> = (1..=8).map(|a| p.backoff_ceiling(a)).collect();
        assert_eq!(ceilings[0], Duration::from_millis(100));
        assert_eq!(ceilings[1], Duration::from_millis(200));
        assert_eq!(ceilings[3], Duration::from_millis(800));
        assert!(ceilings.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*ceilings.last().unwrap(), Duration::from_secs(1));
        assert_eq!(p.backoff_ceiling(200), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_in_band() {
        let p = RetryPolicy::default();
        for attempt in 1..6 {
            let ceiling = p.backoff_ceiling(attempt);
            for _ in 0..50 {
                let d = p.backoff(attempt);
                assert!(d <= ceiling && d >= ceiling / 2, "attempt {attempt}: {d:?} outside band of {ceiling:?}");
            }
        }
    }

    #[test]
    fn disabled_means_single_attempt() {
        assert_eq!(RetryPolicy::disabled().max_attempts, 1);
        assert_eq!(RetryPolicy::default().with_max_attempts(5).max_attempts, 5);
    }
}

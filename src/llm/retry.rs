//! Bounded retry for rate-limited provider calls.
//!
//! Only HTTP 429 is retried. Everything else, including the final 429 once
//! attempts run out, goes back to the caller unchanged.

use futures::Future;
use log::warn;
use reqwest::{ Response, StatusCode };
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn with_initial_delay(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            ..Default::default()
        }
    }

    /// Delay after the `retry`-th failed attempt (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.initial_delay.saturating_mul(self.multiplier.saturating_pow(retry))
    }

    pub fn should_retry(&self, status: StatusCode, attempt: u32) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_attempts
    }
}

pub async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    mut make_request: F
) -> Result<Response, reqwest::Error>
    where F: FnMut() -> Fut, Fut: Future<Output = Result<Response, reqwest::Error>>
{
    let mut attempt = 1;
    loop {
        let resp = make_request().await?;
        if !policy.should_retry(resp.status(), attempt) {
            return Ok(resp);
        }

        let delay = policy.delay_for_retry(attempt - 1);
        warn!(
            "Upstream rate limited (attempt {}/{}), retrying in {:?}",
            attempt,
            policy.max_attempts,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

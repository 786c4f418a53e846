//! Retry transport (spec.md §4.2). One-shot `do_request` and retrying
//! `do_with_retry`, classifying HTTP responses into retryable/non-retryable
//! `CoreError` kinds and signalling the rate limiter on 429.
//!
//! Built directly on `reqwest::Client` rather than the teacher's
//! `reqwest-middleware`/`reqwest-retry` stack: the classification and
//! backoff rules here are a first-class contract (spec.md §8 property 6)
//! and need to be unit-testable independent of an opaque middleware policy.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use tokio::time::sleep;
use tracing::warn;

use crate::application::rate_limiter::RateLimiter;
use crate::domain::errors::CoreError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

pub struct RetryTransport {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl RetryTransport {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// One attempt: send the request and classify the response.
    pub async fn do_request(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, String)],
        rate_limiter: &RateLimiter,
    ) -> Result<Vec<u8>, CoreError> {
        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Err(CoreError::Network(e.to_string())),
        };

        let status = response.status();
        if status.is_success() {
            return response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| CoreError::Network(e.to_string()));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            rate_limiter.on_rate_limit_hit();
            return Err(CoreError::RateLimit);
        }

        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::InvalidParameter(format!(
                "http {status}: {body}"
            )));
        }

        Err(CoreError::Network(format!("http {status}")))
    }

    /// Retries only `NETWORK` and `RATE_LIMIT` kinds, up to `max_attempts`,
    /// sleeping `initial_delay * multiplier^(attempt-1)` between tries. The
    /// sleep is elided after the final attempt.
    pub async fn do_with_retry(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, String)],
        rate_limiter: &RateLimiter,
    ) -> Result<Vec<u8>, CoreError> {
        let mut last_err = None;
        for attempt in 1..=self.policy.max_attempts {
            match self.do_request(method.clone(), url, headers, rate_limiter).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() => {
                    warn!(attempt, error = %e, "retryable transport error");
                    last_err = Some(e);
                    if attempt < self.policy.max_attempts {
                        let delay_secs = self.policy.initial_delay.as_secs_f64()
                            * self.policy.multiplier.powi(attempt as i32 - 1);
                        sleep(Duration::from_secs_f64(delay_secs)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(CoreError::Network("retry loop exhausted with no error recorded".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_spec_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
    }

    #[test]
    fn backoff_sequence_is_geometric() {
        let policy = RetryPolicy::default();
        let delays: Vec<f64> = (1..policy.max_attempts)
            .map(|attempt| {
                policy.initial_delay.as_secs_f64() * policy.multiplier.powi(attempt as i32 - 1)
            })
            .collect();
        assert_eq!(delays, vec![0.5, 1.0]);
    }
}

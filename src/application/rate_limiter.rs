//! Token-bucket rate limiter with adaptive back-off (spec.md §4.1).
//!
//! Grounded on the teacher's `OrderThrottler` (timestamp-window accounting,
//! tick-and-retry loop), generalized from a queue-draining actor into a
//! `Wait`-style gate callable directly from request paths.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::warn;

const RETRY_INTERVAL: Duration = Duration::from_millis(100);
const INITIAL_ADAPTIVE_DELAY: Duration = Duration::from_millis(100);
const MAX_ADAPTIVE_DELAY: Duration = Duration::from_secs(5);

struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
    adaptive_delay: Duration,
    hit_count: u64,
}

/// Token bucket guarding calls to a single exchange venue.
pub struct RateLimiter {
    inner: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(max_calls_per_minute: u32) -> Self {
        let capacity = max_calls_per_minute as f64;
        Self {
            inner: Mutex::new(Bucket {
                capacity,
                tokens: capacity,
                refill_per_sec: capacity / 60.0,
                last_refill: Instant::now(),
                adaptive_delay: Duration::ZERO,
                hit_count: 0,
            }),
        }
    }

    /// Blocks until a token is available, then sleeps the current adaptive
    /// delay. Fair ordering under contention is not guaranteed.
    pub async fn wait(&self) {
        loop {
            let (acquired, delay) = {
                let mut bucket = self.inner.lock().unwrap();
                bucket.refill();
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    (true, bucket.adaptive_delay)
                } else {
                    (false, Duration::ZERO)
                }
            };
            if acquired {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                return;
            }
            sleep(RETRY_INTERVAL).await;
        }
    }

    /// Called by the retry transport on an HTTP 429 response.
    pub fn on_rate_limit_hit(&self) {
        let mut bucket = self.inner.lock().unwrap();
        bucket.adaptive_delay = if bucket.adaptive_delay.is_zero() {
            INITIAL_ADAPTIVE_DELAY
        } else {
            (bucket.adaptive_delay * 2).min(MAX_ADAPTIVE_DELAY)
        };
        bucket.tokens = 0.0;
        bucket.hit_count += 1;
        warn!(
            adaptive_delay_ms = bucket.adaptive_delay.as_millis() as u64,
            hit_count = bucket.hit_count,
            "rate limiter observed HTTP 429"
        );
    }

    pub fn adaptive_delay(&self) -> Duration {
        self.inner.lock().unwrap().adaptive_delay
    }

    pub fn hit_count(&self) -> u64 {
        self.inner.lock().unwrap().hit_count
    }

    /// Clears accumulated back-off. There is no automatic decay by design;
    /// an operator or supervisory task calls this explicitly.
    pub fn reset_backoff(&self) {
        let mut bucket = self.inner.lock().unwrap();
        bucket.adaptive_delay = Duration::ZERO;
        bucket.hit_count = 0;
    }
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            self.last_refill = now;
        }
    }
}

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use rand::Rng;

/// Exponential backoff with jitter for transient HTTP failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential =
            self.initial_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32);
        let mut delay = exponential.min(self.max_delay.as_secs_f64());
        if self.jitter {
            delay *= rand::rng().random_range(0.5..1.5);
        }
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Run `operation` until it succeeds, a non-retryable error occurs, or
    /// the retry budget is exhausted. `is_retryable` classifies errors.
    pub fn run<T, E>(
        &self,
        mut operation: impl FnMut() -> Result<T, E>,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E> {
        let mut attempt = 0;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && is_retryable(&err) => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::debug!(
                        "transient failure (attempt {}), retrying in {:.1}s",
                        attempt + 1,
                        delay.as_secs_f64()
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Enforces a minimum interval between calls to the same host.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(HashMap::new()),
        }
    }

    /// Block until the host's minimum interval has elapsed, then record the
    /// call.
    pub fn wait(&self, host: &str) {
        let sleep_for = {
            let mut last_call = self.last_call.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let sleep_for = last_call
                .get(host)
                .map(|last| self.min_interval.saturating_sub(now.duration_since(*last)))
                .unwrap_or(Duration::ZERO);
            last_call.insert(host.to_string(), now + sleep_for);
            sleep_for
        };
        if !sleep_for.is_zero() {
            std::thread::sleep(sleep_for);
        }
    }
}

use repomirror_core::config::QueueConfig;
use repomirror_core::error::StateError;
use std::time::Duration;
use tracing::warn;

/// Bounded exponential backoff for transient store errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn from_queue_config(queue: &QueueConfig) -> Self {
        Self {
            max_retries: queue.store_max_retries,
            initial_backoff: Duration::from_millis(queue.store_initial_backoff_ms),
            max_backoff: Duration::from_millis(queue.store_max_backoff_ms.max(1)),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * factor)
            .min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter {
            return base;
        }
        let jitter = rand::random::<f64>() * 0.3 + 0.85;
        Duration::from_millis((base.as_millis() as f64 * jitter) as u64)
    }
}

/// Run `operation`, retrying transient store errors with backoff and jitter.
///
/// Non-transient errors are returned immediately; transient ones are returned
/// once `max_retries` is exhausted.
pub fn with_retry<T, F>(config: &RetryConfig, operation_name: &str, mut operation: F) -> Result<T, StateError>
where
    F: FnMut() -> Result<T, StateError>,
{
    let mut attempt = 0u32;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = config.delay(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient store error; retrying"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

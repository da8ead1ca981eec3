use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;

/// Observability hook invoked before each retry sleep with the failed
/// attempt's error and its 1-based attempt number.
pub type RetryHook = Arc<dyn Fn(&dyn fmt::Display, u32) + Send + Sync>;

#[derive(Clone)]
pub struct RetryOptions {
    /// Total attempts including the first one. 0 behaves like 1.
    pub max_attempts: u32,
    pub delay_ms: u64,
    /// Double the delay after every failed attempt.
    pub backoff: bool,
    /// Cap for a single sleep; 0 disables the cap.
    pub max_delay_ms: u64,
    pub on_retry: Option<RetryHook>,
}

impl RetryOptions {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
            backoff: false,
            max_delay_ms: 0,
            on_retry: None,
        }
    }

    /// Single attempt, no retry.
    pub fn once() -> Self {
        Self::new(1, 0)
    }

    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            delay_ms: cfg.base_delay_ms,
            backoff: cfg.strategy != "fixed",
            max_delay_ms: cfg.max_delay_ms,
            on_retry: None,
        }
    }

    pub fn with_backoff(mut self, backoff: bool) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&dyn fmt::Display, u32) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Sleep before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = if self.backoff {
            let exp = 1u64 << attempt.saturating_sub(1).min(30);
            self.delay_ms.saturating_mul(exp)
        } else {
            self.delay_ms
        };
        let delay = if self.max_delay_ms > 0 {
            delay.min(self.max_delay_ms)
        } else {
            delay
        };
        Duration::from_millis(delay)
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("delay_ms", &self.delay_ms)
            .field("backoff", &self.backoff)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

//! Backoff tracking for backend calls
//!
//! Remembers consecutive failures per endpoint key and hands out an
//! exponentially growing delay. Success on a key resets it.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default minimum backoff delay in milliseconds
const MIN_BACKOFF_MS: u64 = 250;
/// Default maximum backoff delay in milliseconds
const MAX_BACKOFF_MS: u64 = 4_000;
/// Time after which to reset backoff if no errors occur
const RESET_AFTER_QUIET_SECS: u64 = 120;

#[derive(Debug, Clone)]
struct BackoffState {
    current_delay_ms: u64,
    last_error_at: Instant,
    error_count: u32,
}

/// Per-endpoint retry manager
pub struct HttpRetryManager {
    min_delay_ms: u64,
    max_delay_ms: u64,
    states: RwLock<HashMap<String, BackoffState>>,
}

impl HttpRetryManager {
    pub fn new() -> Self {
        Self::with_bounds(MIN_BACKOFF_MS, MAX_BACKOFF_MS)
    }

    pub fn with_bounds(min_delay_ms: u64, max_delay_ms: u64) -> Self {
        HttpRetryManager {
            min_delay_ms,
            max_delay_ms: max_delay_ms.max(min_delay_ms),
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Record a successful request, resetting backoff
    pub fn record_success(&self, key: &str) {
        if self.states.write().remove(key).is_some() {
            log::debug!("[BACKEND_RETRY] Success for '{}', backoff reset", key);
        }
    }

    /// Record a failed request and get the delay before the next attempt
    pub fn record_error(&self, key: &str) -> Duration {
        let mut states = self.states.write();
        let now = Instant::now();
        let min_delay_ms = self.min_delay_ms;

        let state = states.entry(key.to_string()).or_insert_with(|| BackoffState {
            current_delay_ms: min_delay_ms,
            last_error_at: now,
            error_count: 0,
        });

        if now.duration_since(state.last_error_at) > Duration::from_secs(RESET_AFTER_QUIET_SECS) {
            state.current_delay_ms = self.min_delay_ms;
            state.error_count = 1;
        } else {
            state.error_count += 1;
            if state.error_count > 1 {
                state.current_delay_ms = (state.current_delay_ms * 2).min(self.max_delay_ms);
            }
        }

        state.last_error_at = now;

        log::warn!(
            "[BACKEND_RETRY] Error #{} for '{}', backoff: {}ms",
            state.error_count,
            key,
            state.current_delay_ms
        );

        Duration::from_millis(state.current_delay_ms)
    }

    /// Check if an HTTP status code indicates a transient failure
    pub fn is_retryable_status(status: u16) -> bool {
        matches!(
            status,
            408 | // Request Timeout
            429 | // Too Many Requests
            502 | // Bad Gateway
            503 | // Service Unavailable
            504   // Gateway Timeout
        )
    }
}

impl Default for HttpRetryManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper function to check if a reqwest error is retryable
pub fn is_reqwest_error_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout()
        || err.is_connect()
        || err
            .status()
            .map(|s| HttpRetryManager::is_retryable_status(s.as_u16()))
            .unwrap_or(false)
}

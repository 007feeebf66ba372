//! Gateway Rate Limiting
//!
//! Fixed-window request counting per client. A burst straddling a window
//! boundary may admit up to twice `max_requests` in a short span.

use std::collections::HashMap;
use std::sync::Mutex;

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 100,
        }
    }
}

/// Returned when a client exhausted its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded, window resets at {reset_time}")]
pub struct RateLimited {
    /// Epoch milliseconds at which the current window ends.
    pub reset_time: i64,
}

#[derive(Debug)]
struct RateWindow {
    count: u32,
    reset_time: i64,
}

/// Rate limiter shared by all gateway connections
pub struct McpRateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<(String, i64), RateWindow>>,
}

impl McpRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: RateLimitConfig {
                window_ms: config.window_ms.max(1),
                ..config
            },
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check if a request is allowed and record it if so
    pub fn check_and_record(&self, client_key: &str) -> Result<(), RateLimited> {
        self.check_and_record_at(client_key, chrono::Utc::now().timestamp_millis())
    }

    pub fn check_and_record_at(&self, client_key: &str, now_ms: i64) -> Result<(), RateLimited> {
        let window_ms = self.config.window_ms as i64;
        let window_index = now_ms.div_euclid(window_ms);

        let mut windows = self.windows.lock().unwrap();
        windows.retain(|_, window| window.reset_time > now_ms);

        let window = windows
            .entry((client_key.to_string(), window_index))
            .or_insert_with(|| RateWindow {
                count: 0,
                reset_time: (window_index + 1) * window_ms,
            });

        if window.count >= self.config.max_requests {
            return Err(RateLimited {
                reset_time: window.reset_time,
            });
        }

        window.count += 1;
        Ok(())
    }

    /// Requests counted for a client in the window containing `now_ms`.
    pub fn get_usage_at(&self, client_key: &str, now_ms: i64) -> Option<u32> {
        let window_index = now_ms.div_euclid(self.config.window_ms as i64);
        self.windows
            .lock()
            .unwrap()
            .get(&(client_key.to_string(), window_index))
            .map(|w| w.count)
    }

    /// Number of live windows (for debugging/metrics)
    pub fn tracked_windows(&self) -> usize {
        self.windows.lock().unwrap().len()
    }
}

impl Default for McpRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

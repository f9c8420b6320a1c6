// Sliding-window rate limiter, in memory

use crate::utils::error::{PosternError, Result};
use crate::utils::time::Clock;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Allows at most `limit` hits per key within any `window`.
pub struct RateLimiter {
    hits: DashMap<String, VecDeque<DateTime<Utc>>>,
    limit: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            hits: DashMap::new(),
            limit,
            window,
            clock,
        }
    }

    /// Record a hit for `key`, or refuse it if the window is full.
    ///
    /// Refused hits are not recorded.
    pub fn check(&self, key: &str) -> Result<()> {
        let now = self.clock.now();
        let window_start = now - self.window;

        let mut hits = self.hits.entry(key.to_string()).or_default();
        while hits.front().is_some_and(|t| *t <= window_start) {
            hits.pop_front();
        }

        if hits.len() >= self.limit {
            return Err(PosternError::RateLimited);
        }

        hits.push_back(now);
        Ok(())
    }

    /// Forget every key whose window has fully elapsed.
    pub fn prune(&self) {
        let window_start = self.clock.now() - self.window;
        self.hits
            .retain(|_, hits| hits.back().is_some_and(|t| *t > window_start));
    }

    pub fn reset(&self, key: &str) {
        self.hits.remove(key);
    }
}

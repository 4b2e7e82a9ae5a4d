//! Fixed-window rate limiting for the expensive endpoints.
//!
//! Used per source IP on pack generation, the endpoint that calls an LLM.
//! Websocket inbound has its own lighter per-connection counter and does
//! not go through this map.

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::RwLock, time::Instant};

/// Fixed-window counter keyed by an arbitrary string (IP, connection id).
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// key -> (request count, window start)
    requests: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Returns true if the request is allowed, false if rate limited.
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        match requests.get_mut(key) {
            Some((count, window_start)) => {
                if now.duration_since(*window_start) >= self.window {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count >= self.max_requests {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                requests.insert(key.to_string(), (1, now));
                true
            }
        }
    }

    /// Drop stale entries (call periodically).
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window * 2);
    }

    /// Background task pruning stale entries on a fixed interval, so the
    /// per-key map does not grow without bound.
    pub fn spawn_cleanup(&self, interval: Duration) {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            loop {
                interval.tick().await;
                limiter.cleanup().await;
            }
        });
    }
}

//! Per-subject token buckets for the request layer.
//!
//! The limiter is an ordinary value: the serving layer creates one and hands it to
//! whatever checks requests. Buckets are created on first use.

use log::debug;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RequestLimiter {
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RequestLimiter {
    /// Allows bursts of `capacity` requests, refilled at `refill_rate` per second.
    pub fn new(capacity: usize, refill_rate: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_rate: refill_rate.max(0.0),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Takes one token from `subject`'s bucket. `false` means the request should be
    /// rejected.
    pub async fn try_acquire(&self, subject: &str) -> bool {
        self.try_acquire_at(subject, Instant::now()).await
    }

    pub async fn try_acquire_at(&self, subject: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(subject.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            debug!("Rate limit reached for '{}'", subject);
            false
        }
    }

    /// Drops buckets that have been full for at least `idle`.
    pub async fn prune(&self, now: Instant, idle: Duration) {
        let capacity = self.capacity;
        let rate = self.refill_rate;
        self.buckets.lock().await.retain(|_, bucket| {
            let elapsed = now.saturating_duration_since(bucket.last_refill);
            let refilled = bucket.tokens + elapsed.as_secs_f64() * rate;
            refilled < capacity || elapsed < idle
        });
    }

    pub async fn tracked_subjects(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

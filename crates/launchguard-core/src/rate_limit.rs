//! Token-bucket pacing for calls to the chain-data collaborator.
//!
//! One pacer is shared by every analysis task so that concurrent launches
//! together stay under the collaborator's rate limit. With `burst = 1` it
//! degenerates to a fixed minimum spacing between calls.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RequestPacer {
    capacity: f64,
    /// Tokens added per millisecond; zero spacing disables pacing.
    refill_per_ms: Option<f64>,
    bucket: Mutex<Bucket>,
}

impl RequestPacer {
    pub fn new(spacing: Duration, burst: u32) -> Self {
        let capacity = burst.max(1) as f64;
        let spacing_ms = spacing.as_secs_f64() * 1000.0;
        let refill_per_ms = if spacing_ms > 0.0 {
            Some(1.0 / spacing_ms)
        } else {
            None
        };

        Self {
            capacity,
            refill_per_ms,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// No pacing at all. Used by tests and offline tools.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO, 1)
    }

    /// Waits until one request may be issued.
    pub async fn acquire(&self) {
        let Some(refill_per_ms) = self.refill_per_ms else {
            return;
        };

        // The lock is held across the sleep so that waiters queue in order.
        let mut bucket = self.bucket.lock().await;
        loop {
            let now = Instant::now();
            let elapsed_ms = now.duration_since(bucket.last_refill).as_secs_f64() * 1000.0;
            bucket.tokens = (bucket.tokens + elapsed_ms * refill_per_ms).min(self.capacity);
            bucket.last_refill = now;

            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return;
            }

            let wait_ms = ((1.0 - bucket.tokens) / refill_per_ms).ceil() as u64;
            trace!(wait_ms, "Request pacer waiting for token");
            sleep(Duration::from_millis(wait_ms.max(1))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spaces_requests_after_burst() {
        let pacer = RequestPacer::new(Duration::from_millis(200), 1);
        let start = Instant::now();

        pacer.acquire().await;
        pacer.acquire().await;
        pacer.acquire().await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(400), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(600), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_served_immediately() {
        let pacer = RequestPacer::new(Duration::from_millis(100), 3);
        let start = Instant::now();

        for _ in 0..3 {
            pacer.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));

        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn unlimited_never_waits() {
        let pacer = RequestPacer::unlimited();
        for _ in 0..1000 {
            pacer.acquire().await;
        }
    }
}

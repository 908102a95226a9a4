use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token bucket rate limiter per IP address.
///
/// Each IP starts with `max_requests` tokens and regains them evenly over
/// `window`, so a steady client gets `max_requests` per window and a quiet
/// one may burst up to the full allowance.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

#[derive(Debug)]
struct RateLimiterInner {
    buckets: RwLock<HashMap<IpAddr, TokenBucket>>,
    /// Maximum tokens in bucket
    capacity: f64,
    /// Tokens added per second
    refill_rate: f64,
    /// How long an idle bucket is kept before `cleanup` drops it
    idle_ttl: Duration,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let window_secs = window.as_secs_f64().max(f64::EPSILON);
        Self {
            inner: Arc::new(RateLimiterInner {
                buckets: RwLock::new(HashMap::new()),
                capacity: max_requests as f64,
                refill_rate: max_requests as f64 / window_secs,
                idle_ttl: window,
            }),
        }
    }

    /// Check if a request from this IP is allowed, consuming a token if so.
    pub async fn check(&self, ip: IpAddr) -> bool {
        let mut buckets = self.inner.buckets.write().await;

        let bucket = buckets.entry(ip).or_insert_with(|| TokenBucket {
            tokens: self.inner.capacity,
            last_refill: Instant::now(),
        });

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.inner.refill_rate).min(self.inner.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole seconds until an empty bucket has one token again.
    pub fn retry_after_secs(&self) -> u64 {
        if self.inner.capacity < 1.0 {
            return self.inner.idle_ttl.as_secs().max(1);
        }
        (self.inner.idle_ttl.as_secs_f64() / self.inner.capacity)
            .ceil()
            .max(1.0) as u64
    }

    /// Drop buckets that have been idle for a whole window. An idle bucket
    /// would have refilled completely anyway.
    pub async fn cleanup(&self) {
        let mut buckets = self.inner.buckets.write().await;
        let now = Instant::now();

        buckets.retain(|_, bucket| now.duration_since(bucket.last_refill) < self.inner.idle_ttl);
    }

    pub async fn stats(&self) -> RateLimiterStats {
        let buckets = self.inner.buckets.read().await;

        RateLimiterStats {
            total_ips: buckets.len(),
            rate_limited: buckets.values().filter(|b| b.tokens < 1.0).count(),
        }
    }

    /// Periodically prune idle buckets until the process exits.
    pub fn spawn_cleanup(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                limiter.cleanup().await;
                let stats = limiter.stats().await;
                tracing::debug!(
                    "Rate limiter: {} tracked IPs, {} currently limited",
                    stats.total_ips,
                    stats.rate_limited
                );
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub total_ips: usize,
    pub rate_limited: usize,
}

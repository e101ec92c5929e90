use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::debug;

use crate::error::RateError;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Token bucket guarding a throttled external API.
///
/// Callers take a token before every outbound request. When the bucket is
/// empty they wait at most `wait_timeout` for a refill.
pub struct CallLimiter {
    inner: DirectLimiter,
    wait_timeout: Duration,
}

impl CallLimiter {
    pub fn per_minute(calls: u32, burst: u32, wait_timeout: Duration) -> Self {
        let calls = NonZeroU32::new(calls).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(calls);
        let quota = Quota::per_minute(calls).allow_burst(burst);
        Self {
            inner: RateLimiter::direct(quota),
            wait_timeout,
        }
    }

    pub async fn acquire(&self) -> Result<(), RateError> {
        if self.inner.check().is_ok() {
            return Ok(());
        }

        debug!(wait_timeout = ?self.wait_timeout, "rate limiter exhausted, waiting for a token");
        tokio::time::timeout(self.wait_timeout, self.inner.until_ready())
            .await
            .map_err(|_| RateError::RateLimitWaitExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_is_granted_immediately() {
        let limiter = CallLimiter::per_minute(60, 3, Duration::from_millis(10));
        for _ in 0..3 {
            limiter.acquire().await.unwrap();
        }
    }

    #[tokio::test]
    async fn exhausted_bucket_fails_after_wait() {
        let limiter = CallLimiter::per_minute(1, 1, Duration::from_millis(50));
        limiter.acquire().await.unwrap();

        let err = limiter.acquire().await.unwrap_err();
        assert!(matches!(err, RateError::RateLimitWaitExceeded));
    }

    #[tokio::test]
    async fn waiting_caller_gets_token_when_refill_is_quick() {
        // 600/min refills one token every 100ms.
        let limiter = CallLimiter::per_minute(600, 1, Duration::from_secs(2));
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
    }
}

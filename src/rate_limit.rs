//! Minimum-interval rate limiter shared by callers of an external service.

use std::sync::Arc;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota,
};
use tracing::debug;

use crate::errors::TrackerError;

type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Grants at most one request per interval.
///
/// Clones share the same quota, so every registry caller draws from one
/// budget.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Result<Self, TrackerError> {
        let quota = Quota::with_period(min_interval).ok_or_else(|| {
            TrackerError::ConfigurationError {
                message: "Rate limit interval must be greater than zero".to_string(),
            }
        })?;

        Ok(Self {
            limiter: Arc::new(governor::RateLimiter::direct(quota)),
        })
    }

    /// Wait until the next request may be sent.
    pub async fn acquire(&self) {
        if self.limiter.check().is_ok() {
            return;
        }
        debug!("Rate limiting: waiting for next slot");
        self.limiter.until_ready().await;
    }
}

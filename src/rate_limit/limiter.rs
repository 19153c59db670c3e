use crate::domain::DeviceId;
use crate::rate_limit::store::{RateLimitDecision, RateLimitPermit, RateLimitStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

/// Minimum-interval limits on script requests, one keyed on the source IP and one keyed on the
/// device. A zero interval disables the respective limit.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    ip_interval: Duration,
    device_interval: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, ip_interval: Duration, device_interval: Duration) -> Self {
        RateLimiter {
            store,
            ip_interval,
            device_interval,
        }
    }

    #[instrument(skip(self))]
    pub async fn check_ip(&self, ip: &str) -> RateLimitDecision {
        let key = format!("ip:{}", sanitize_ip_key(ip));
        let decision = self.check(&key, self.ip_interval).await;
        if let RateLimitDecision::Denied { retry_after_secs } = decision {
            warn!(ip, retry_after_secs, "🚦 IP rate limit hit");
        }
        decision
    }

    #[instrument(skip(self))]
    pub async fn check_device(&self, id: &DeviceId) -> RateLimitDecision {
        let key = format!("device:{}", id);
        let decision = self.check(&key, self.device_interval).await;
        if let RateLimitDecision::Denied { retry_after_secs } = decision {
            warn!(device_id = %id, retry_after_secs, "🚦 Device rate limit hit");
        }
        decision
    }

    pub fn device_interval(&self) -> Duration {
        self.device_interval
    }

    pub async fn release(&self, permit: &RateLimitPermit) {
        self.store.release(permit).await;
    }

    async fn check(&self, key: &str, interval: Duration) -> RateLimitDecision {
        self.store.try_acquire(key, interval, Utc::now()).await
    }
}

pub fn sanitize_ip_key(ip: &str) -> String {
    let trimmed = ip.trim();
    if trimmed.is_empty() {
        return "unknown-ip".to_string();
    }

    trimmed.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '-' }).collect()
}

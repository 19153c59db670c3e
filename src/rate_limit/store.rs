use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;
use tracing::trace;

const SWEEP_THRESHOLD: usize = 1024;

#[derive(PartialEq, Debug, Clone)]
pub enum RateLimitDecision {
    Allowed(RateLimitPermit),
    Denied { retry_after_secs: u64 },
}

#[derive(PartialEq, Debug, Clone)]
pub struct RateLimitPermit {
    key: String,
    acquired_at: DateTime<Utc>,
}

/// Keeps the timestamp of the last accepted request per key. Checking and recording happen as a
/// single step: an `Allowed` decision is the claim itself.
#[async_trait]
pub trait RateLimitStore: Debug + Send + Sync {
    async fn try_acquire(&self, key: &str, interval: Duration, now: DateTime<Utc>) -> RateLimitDecision;

    /// Forgets the permit's timestamp unless a newer request has been accepted since.
    async fn release(&self, permit: &RateLimitPermit);
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    accepted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        MemoryRateLimitStore::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn try_acquire(&self, key: &str, interval: Duration, now: DateTime<Utc>) -> RateLimitDecision {
        let interval = TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX);
        let mut entries = self.entries.lock();

        if entries.len() >= SWEEP_THRESHOLD {
            entries.retain(|_, entry| entry.expires_at > now);
            trace!(remaining = entries.len(), "Swept expired rate limit entries");
        }

        if let Some(entry) = entries.get(key) {
            let elapsed = now - entry.accepted_at;
            if elapsed < interval {
                return RateLimitDecision::Denied {
                    retry_after_secs: retry_after_secs(interval - elapsed),
                };
            }
        }

        entries.insert(
            key.to_string(),
            Entry {
                accepted_at: now,
                expires_at: now.checked_add_signed(interval).unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );

        RateLimitDecision::Allowed(RateLimitPermit {
            key: key.to_string(),
            acquired_at: now,
        })
    }

    async fn release(&self, permit: &RateLimitPermit) {
        let mut entries = self.entries.lock();
        if entries.get(&permit.key).is_some_and(|entry| entry.accepted_at == permit.acquired_at) {
            entries.remove(&permit.key);
        }
    }
}

fn retry_after_secs(remaining: TimeDelta) -> u64 {
    let millis = remaining.num_milliseconds().max(0) as u64;
    millis.div_ceil(1000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const MINUTE: Duration = Duration::from_secs(60);

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn first_request_is_allowed() {
        let store = MemoryRateLimitStore::new();

        let decision = store.try_acquire("device:a", MINUTE, at(0)).await;

        assert!(matches!(decision, RateLimitDecision::Allowed(_)));
    }

    #[rstest]
    #[case(0, 60)]
    #[case(1, 59)]
    #[case(59, 1)]
    #[tokio::test]
    async fn requests_within_the_interval_are_denied_with_the_remaining_time(#[case] after_secs: i64, #[case] expected: u64) {
        let store = MemoryRateLimitStore::new();
        store.try_acquire("device:a", MINUTE, at(0)).await;

        let decision = store.try_acquire("device:a", MINUTE, at(after_secs)).await;

        assert_eq!(decision, RateLimitDecision::Denied { retry_after_secs: expected });
    }

    #[tokio::test]
    async fn requests_after_the_interval_are_allowed() {
        let store = MemoryRateLimitStore::new();
        store.try_acquire("device:a", MINUTE, at(0)).await;

        let decision = store.try_acquire("device:a", MINUTE, at(60)).await;

        assert!(matches!(decision, RateLimitDecision::Allowed(_)));
    }

    #[tokio::test]
    async fn denied_requests_do_not_extend_the_window() {
        let store = MemoryRateLimitStore::new();
        store.try_acquire("device:a", MINUTE, at(0)).await;
        store.try_acquire("device:a", MINUTE, at(30)).await;

        let decision = store.try_acquire("device:a", MINUTE, at(61)).await;

        assert!(matches!(decision, RateLimitDecision::Allowed(_)));
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = MemoryRateLimitStore::new();
        store.try_acquire("device:a", MINUTE, at(0)).await;

        let decision = store.try_acquire("device:b", MINUTE, at(0)).await;

        assert!(matches!(decision, RateLimitDecision::Allowed(_)));
    }

    #[tokio::test]
    async fn release_hands_the_slot_back() {
        let store = MemoryRateLimitStore::new();
        let RateLimitDecision::Allowed(permit) = store.try_acquire("device:a", MINUTE, at(0)).await else {
            panic!("expected the first request to be allowed");
        };

        store.release(&permit).await;

        let decision = store.try_acquire("device:a", MINUTE, at(1)).await;
        assert!(matches!(decision, RateLimitDecision::Allowed(_)));
    }

    #[tokio::test]
    async fn release_of_an_outdated_permit_keeps_the_newer_entry() {
        let store = MemoryRateLimitStore::new();
        let RateLimitDecision::Allowed(old) = store.try_acquire("device:a", MINUTE, at(0)).await else {
            panic!("expected the first request to be allowed");
        };
        store.try_acquire("device:a", MINUTE, at(60)).await;

        store.release(&old).await;

        let decision = store.try_acquire("device:a", MINUTE, at(61)).await;
        assert_eq!(decision, RateLimitDecision::Denied { retry_after_secs: 59 });
    }

    #[tokio::test]
    async fn expired_entries_are_swept() {
        let store = MemoryRateLimitStore::new();
        for i in 0..SWEEP_THRESHOLD {
            store.try_acquire(&format!("ip:{}", i), MINUTE, at(0)).await;
        }

        store.try_acquire("ip:late", MINUTE, at(120)).await;

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_admit_exactly_one() {
        let store = std::sync::Arc::new(MemoryRateLimitStore::new());

        let handles = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.try_acquire("device:a", MINUTE, Utc::now()).await })
            })
            .collect::<Vec<_>>();

        let mut allowed = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), RateLimitDecision::Allowed(_)) {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 1);
    }
}

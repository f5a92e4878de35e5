//! Idempotency and concurrency guard.
//!
//! Three layers sit in front of every balance-mutating operation:
//! a per-user rate limit, a short-horizon dedupe of identical
//! `(operation, user, resource)` requests, and a cooperative mutex keyed by
//! user (or wheel). Idempotency keys themselves are enforced by the store's
//! unique constraint; see the spin engines.

use futures::future::BoxFuture;
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use starspin_types::{GameId, UserId};
use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;

use crate::config::EngineConfig;
use crate::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockKey {
    User(UserId),
    Wheel(GameId),
}

/// Map of async mutexes created on demand and dropped once unused.
pub struct KeyedMutex<K> {
    locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Clone + Eq + Hash> KeyedMutex<K> {
    /// Waits until `key` is free. The lock is released when the guard drops.
    pub async fn lock(self: &Arc<Self>, key: K) -> KeyedGuard<K> {
        let slot = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key.clone()).or_default().clone()
        };
        let held = slot.lock_owned().await;
        KeyedGuard {
            key,
            held: Some(held),
            owner: self.clone(),
        }
    }

    /// Number of keys currently locked or awaited.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct KeyedGuard<K: Clone + Eq + Hash> {
    key: K,
    held: Option<OwnedMutexGuard<()>>,
    owner: Arc<KeyedMutex<K>>,
}

impl<K: Clone + Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        self.held.take();
        let mut locks = self.owner.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map itself still references the mutex: nobody is waiting.
        if locks
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

/// Proof that the caller holds the per-user mutex.
pub struct UserLock {
    user_id: UserId,
    _guard: KeyedGuard<LockKey>,
}

impl UserLock {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

pub struct WheelLock {
    _guard: KeyedGuard<LockKey>,
}

/// Rejects identical requests seen within a short window.
pub trait RequestDedupe: Send + Sync {
    /// Returns `false` when `key` was already started within `window`.
    fn try_begin<'a>(&'a self, key: &'a str, window: Duration) -> BoxFuture<'a, bool>;

    /// Drops expired entries.
    fn prune(&self) {}
}

#[derive(Default)]
pub struct MemoryDedupe {
    started: Mutex<HashMap<String, (Instant, Duration)>>,
}

impl RequestDedupe for MemoryDedupe {
    fn try_begin<'a>(&'a self, key: &'a str, window: Duration) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let now = Instant::now();
            let mut started = self.started.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((at, held_for)) = started.get(key) {
                if now.duration_since(*at) < *held_for {
                    return false;
                }
            }
            started.insert(key.to_string(), (now, window));
            true
        })
    }

    fn prune(&self) {
        let now = Instant::now();
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, (at, held_for)| now.duration_since(*at) < *held_for);
    }
}

/// Per-user request budget.
pub trait RateLimit: Send + Sync {
    /// Consumes one unit, or returns how long to wait before retrying.
    fn try_consume(&self, user: UserId) -> Result<(), Duration>;

    fn prune(&self) {}
}

type KeyedLimiter = RateLimiter<UserId, DefaultKeyedStateStore<UserId>, DefaultClock>;

/// Per-second and per-minute quotas; a zero quota is not enforced.
pub struct GovernorRateLimit {
    per_second: Option<KeyedLimiter>,
    per_minute: Option<KeyedLimiter>,
}

impl GovernorRateLimit {
    pub fn new(per_second: u32, per_minute: u32) -> Self {
        Self {
            per_second: NonZeroU32::new(per_second)
                .map(|n| RateLimiter::keyed(Quota::per_second(n))),
            per_minute: NonZeroU32::new(per_minute)
                .map(|n| RateLimiter::keyed(Quota::per_minute(n))),
        }
    }
}

impl RateLimit for GovernorRateLimit {
    fn try_consume(&self, user: UserId) -> Result<(), Duration> {
        for limiter in [&self.per_second, &self.per_minute].into_iter().flatten() {
            if let Err(not_until) = limiter.check_key(&user) {
                return Err(not_until.wait_time_from(DefaultClock::default().now()));
            }
        }
        Ok(())
    }

    fn prune(&self) {
        for limiter in [&self.per_second, &self.per_minute].into_iter().flatten() {
            limiter.retain_recent();
        }
    }
}

pub struct Guard {
    locks: Arc<KeyedMutex<LockKey>>,
    limiter: Arc<dyn RateLimit>,
    dedupe: Arc<dyn RequestDedupe>,
    dedupe_window: Duration,
}

impl Guard {
    pub fn new(
        limiter: Arc<dyn RateLimit>,
        dedupe: Arc<dyn RequestDedupe>,
        dedupe_window: Duration,
    ) -> Self {
        Self {
            locks: Arc::new(KeyedMutex::default()),
            limiter,
            dedupe,
            dedupe_window,
        }
    }

    /// Single-instance guard: governor limiters and an in-process dedupe map.
    pub fn in_memory(config: &EngineConfig) -> Self {
        Self::new(
            Arc::new(GovernorRateLimit::new(
                config.rate_limit_per_second,
                config.rate_limit_per_minute,
            )),
            Arc::new(MemoryDedupe::default()),
            Duration::from_millis(config.dedupe_window_ms),
        )
    }

    pub fn check_rate(&self, user: UserId) -> Result<(), EngineError> {
        self.limiter.try_consume(user).map_err(|wait| {
            tracing::debug!(user_id = user, wait_ms = wait.as_millis() as u64, "rate limited");
            EngineError::RateLimited {
                retry_after_ms: wait.as_millis().max(1) as u64,
            }
        })
    }

    /// Rejects a repeat of `(op, user, resource)` inside the dedupe window.
    pub async fn begin(
        &self,
        op: &str,
        user: UserId,
        resource: &str,
    ) -> Result<(), EngineError> {
        if self.dedupe_window.is_zero() {
            return Ok(());
        }
        let key = format!("{op}:{user}:{resource}");
        if self.dedupe.try_begin(&key, self.dedupe_window).await {
            Ok(())
        } else {
            tracing::debug!(user_id = user, op, resource, "duplicate request rejected");
            Err(EngineError::RequestInProgress)
        }
    }

    /// Rate limit followed by dedupe.
    pub async fn admit(
        &self,
        op: &str,
        user: UserId,
        resource: &str,
    ) -> Result<(), EngineError> {
        self.check_rate(user)?;
        self.begin(op, user, resource).await
    }

    pub async fn lock_user(&self, user: UserId) -> UserLock {
        UserLock {
            user_id: user,
            _guard: self.locks.lock(LockKey::User(user)).await,
        }
    }

    /// Wheel locks are always taken before the user lock.
    pub async fn lock_wheel(&self, wheel: GameId) -> WheelLock {
        WheelLock {
            _guard: self.locks.lock(LockKey::Wheel(wheel)).await,
        }
    }

    pub fn held_locks(&self) -> usize {
        self.locks.len()
    }

    pub fn housekeeping(&self) {
        self.limiter.prune();
        self.dedupe.prune();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn keyed_mutex_serializes_same_key() {
        let locks = Arc::new(KeyedMutex::<u32>::default());
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(7).await;
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn lock_is_released_on_error_paths() {
        let locks = Arc::new(KeyedMutex::<u32>::default());
        let attempt = |locks: Arc<KeyedMutex<u32>>| async move {
            let _guard = locks.lock(1).await;
            Err::<(), &str>("failed")
        };
        assert!(attempt(locks.clone()).await.is_err());
        assert!(locks.is_empty());
        let _again = locks.lock(1).await;
    }

    #[tokio::test]
    async fn dedupe_rejects_within_window() {
        let dedupe = MemoryDedupe::default();
        let window = Duration::from_secs(60);
        assert!(dedupe.try_begin("spin:1:3", window).await);
        assert!(!dedupe.try_begin("spin:1:3", window).await);
        assert!(dedupe.try_begin("spin:2:3", window).await);
        assert!(dedupe.try_begin("other", Duration::ZERO).await);
        assert!(dedupe.try_begin("other", Duration::ZERO).await);
    }

    #[tokio::test]
    async fn guard_maps_rejections_to_errors() {
        let config = EngineConfig {
            rate_limit_per_second: 1,
            rate_limit_per_minute: 0,
            dedupe_window_ms: 60_000,
            ..EngineConfig::default()
        };
        let guard = Guard::in_memory(&config);
        guard.admit("spin", 1, "case:1").await.unwrap();
        assert!(matches!(
            guard.check_rate(1),
            Err(EngineError::RateLimited { .. })
        ));
        guard.check_rate(2).unwrap();
        assert!(matches!(
            guard.begin("spin", 1, "case:1").await,
            Err(EngineError::RequestInProgress)
        ));
    }

    #[test]
    fn zero_quota_disables_limit() {
        let limiter = GovernorRateLimit::new(0, 0);
        for _ in 0..100 {
            limiter.try_consume(1).unwrap();
        }
    }
}

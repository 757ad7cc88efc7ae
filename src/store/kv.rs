//! Keyed store with per-key TTL and atomic conditional writes
//!
//! `KeyValueStore` is the trait boundary where a remote store (with
//! server-side scripted CAS) would slot in; `MemoryStore` is the in-process
//! implementation. Nothing above the trait holds store values in local
//! memory across calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Expected prior value for `compare_and_set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected<'a> {
    /// Key must be absent (or expired)
    Absent,
    /// Key must hold exactly this value
    Value(&'a str),
    /// Key absent or holding this value; encodes "absent reads as the
    /// default/initial value" for session state
    AbsentOr(&'a str),
}

/// Keyed store with TTL and atomic conditional writes.
///
/// `compare_and_set` and `put_if_absent` must each be a single indivisible
/// operation: a read-then-write from the caller would let two redelivered
/// copies of one event both observe the pre-transition value and both apply
/// it, double-firing side effects.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a live value; expired entries read as absent. No side effects.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditional write; (re)starts the TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Atomically write `value` and refresh the TTL if the stored value
    /// matches `expected`; otherwise leave the store untouched and return
    /// false.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Expected<'_>,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool>;

    /// Atomic "create only if absent" with TTL; the lock-acquire primitive.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Atomically delete the key only if it still holds `expected`; the
    /// lock-release primitive. Returns false (store untouched) when the key
    /// is absent or holds another value.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Idempotent delete; an absent key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Expected<'_>,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        (**self).compare_and_set(key, expected, value, ttl).await
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        (**self).put_if_absent(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        (**self).compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        (**self).delete(key).await
    }
}

/// Time source for TTL bookkeeping; injectable so expiry is testable
/// without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for TTL tests
#[cfg(test)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process `KeyValueStore` with per-key TTL.
///
/// Every conditional operation runs to completion under one mutex guard,
/// which is what makes it indivisible.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Live value under the guard; expired entries read as absent
fn live<'a>(entries: &'a HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a str> {
    entries
        .get(key)
        .filter(|entry| entry.expires_at > now)
        .map(|entry| entry.value.as_str())
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now();
        let entries = self.lock()?;
        Ok(live(&entries, key, now).map(String::from))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Expected<'_>,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        let current = live(&entries, key, now);
        let matches = match expected {
            Expected::Absent => current.is_none(),
            Expected::Value(v) => current == Some(v),
            Expected::AbsentOr(v) => current.is_none() || current == Some(v),
        };
        if matches {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: now + ttl,
                },
            );
        }
        Ok(matches)
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        self.compare_and_set(key, Expected::Absent, value, ttl)
            .await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        let matches = live(&entries, key, now) == Some(expected);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let store = MemoryStore::new();
        store.set("k", "v1", TTL).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v1".to_string()));
        store.set("k", "v2", TTL).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn entries_expire_at_ttl() {
        let clock = Arc::new(ManualClock::new());
        let store = MemoryStore::with_clock(clock.clone());
        store.set("k", "v", Duration::from_secs(30)).await.unwrap();

        clock.advance(Duration::from_secs(29));
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_restarts_the_ttl() {
        let clock = Arc::new(ManualClock::new());
        let store = MemoryStore::with_clock(clock.clone());
        store.set("k", "v", Duration::from_secs(30)).await.unwrap();

        clock.advance(Duration::from_secs(20));
        store.set("k", "v", Duration::from_secs(30)).await.unwrap();

        clock.advance(Duration::from_secs(20));
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn cas_absent_or_treats_missing_key_as_default() {
        let store = MemoryStore::new();
        assert!(store
            .compare_and_set("k", Expected::AbsentOr("idle"), "next", TTL)
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("next".to_string()));

        // A second identical attempt sees "next", not the default
        assert!(!store
            .compare_and_set("k", Expected::AbsentOr("idle"), "other", TTL)
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("next".to_string()));
    }

    #[tokio::test]
    async fn cas_mismatch_leaves_store_untouched() {
        let store = MemoryStore::new();
        store.set("k", "a", TTL).await.unwrap();
        assert!(!store
            .compare_and_set("k", Expected::Value("b"), "c", TTL)
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn cas_against_expired_entry_sees_absent() {
        let clock = Arc::new(ManualClock::new());
        let store = MemoryStore::with_clock(clock.clone());
        store.set("k", "old", Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(11));

        assert!(!store
            .compare_and_set("k", Expected::Value("old"), "new", TTL)
            .await
            .unwrap());
        assert!(store
            .compare_and_set("k", Expected::Absent, "new", TTL)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn put_if_absent_rejects_live_entries() {
        let store = MemoryStore::new();
        assert!(store.put_if_absent("k", "first", TTL).await.unwrap());
        assert!(!store.put_if_absent("k", "second", TTL).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn compare_and_delete_requires_the_stored_value() {
        let store = MemoryStore::new();
        store.set("k", "mine", TTL).await.unwrap();

        assert!(!store.compare_and_delete("k", "theirs").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("mine".to_string()));

        assert!(store.compare_and_delete("k", "mine").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);

        // Absent key never matches
        assert!(!store.compare_and_delete("k", "mine").await.unwrap());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.set("k", "v", TTL).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_cas_has_exactly_one_winner() {
        let store = MemoryStore::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_set("k", Expected::Absent, &format!("winner-{i}"), TTL)
                    .await
                    .unwrap()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }
}

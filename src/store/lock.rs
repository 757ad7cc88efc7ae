//! Per-(user, operation) advisory locks over the keyed store
//!
//! Acquire is non-blocking: a contended lock means another task already
//! owns the operation and the caller should report busy, never queue. The
//! TTL is the liveness backstop when a holder dies without releasing.
//!
//! Each acquisition stores a caller-supplied token and release is fenced
//! on it: a worker whose lock was force-released (and possibly handed to a
//! new holder) cannot delete the new holder's lock.

use crate::store::kv::{KeyValueStore, StoreResult};
use crate::store::records::lock_key;
use futures::FutureExt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct LockManager<S> {
    store: S,
    ttl: Duration,
}

/// Outcome of a scoped exclusive section
#[derive(Debug, PartialEq, Eq)]
pub enum Exclusive<T> {
    /// Another holder owns the lock; the body never ran
    Contended,
    Completed(T),
}

impl<S: KeyValueStore + Clone + 'static> LockManager<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Try to take the lock, storing `token` as the fencing value; false
    /// means contended. The token must be unique per acquisition.
    pub async fn acquire(&self, user_id: &str, operation: &str, token: &str) -> StoreResult<bool> {
        self.store
            .put_if_absent(&lock_key(user_id, operation), token, self.ttl)
            .await
    }

    /// Fenced release: deletes the lock only while it still holds `token`.
    /// A mismatch means the lock expired or was force-released and possibly
    /// reacquired; the current holder keeps it.
    pub async fn release(&self, user_id: &str, operation: &str, token: &str) -> StoreResult<()> {
        let released = self
            .store
            .compare_and_delete(&lock_key(user_id, operation), token)
            .await?;
        if !released {
            debug!(user_id, operation, "lock token stale on release; left untouched");
        }
        Ok(())
    }

    /// Unconditional release, for session resets that must free the lock no
    /// matter which worker holds it. The superseded worker's own fenced
    /// release then becomes a no-op.
    pub async fn force_release(&self, user_id: &str, operation: &str) -> StoreResult<()> {
        self.store.delete(&lock_key(user_id, operation)).await
    }

    /// Run `body` under the lock, releasing on completion, error, or panic.
    ///
    /// Used in tests; production composition holds the lock across a
    /// detached task and releases from the worker instead.
    #[allow(dead_code)]
    pub async fn run_exclusive<T, F, Fut>(
        &self,
        user_id: &str,
        operation: &str,
        body: F,
    ) -> StoreResult<Exclusive<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let token = uuid::Uuid::new_v4().to_string();
        if !self.acquire(user_id, operation, &token).await? {
            return Ok(Exclusive::Contended);
        }

        let outcome = std::panic::AssertUnwindSafe(body()).catch_unwind().await;
        if let Err(err) = self.release(user_id, operation, &token).await {
            // The TTL will reap it; the outcome still stands
            warn!(user_id, operation, %err, "failed to release lock");
        }

        match outcome {
            Ok(value) => Ok(Exclusive::Completed(value)),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Run `task` detached, releasing a lock the caller already acquired
    /// with `token` when it finishes. A panic in `task` still releases.
    ///
    /// The caller holds the lock across the spawn so it can seed state
    /// (the in-flight record) before the worker becomes observable.
    pub fn spawn_guarded<F>(&self, user_id: &str, operation: &str, token: String, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let locks = self.clone();
        let user_id = user_id.to_string();
        let operation = operation.to_string();
        tokio::spawn(async move {
            let outcome = std::panic::AssertUnwindSafe(task).catch_unwind().await;
            if let Err(err) = locks.release(&user_id, &operation, &token).await {
                warn!(user_id, operation, %err, "failed to release lock");
            }
            if outcome.is_err() {
                error!(user_id, operation, "guarded task panicked");
            }
        });
    }
}

//! Typed facade over the keyed store for session state, pending input, and
//! task records
//!
//! State transitions go through `transition_state`, which is a CAS on the
//! serialized state the caller observed. Two handlers racing on the same
//! session each try to move from the snapshot they read; exactly one wins.

use crate::flow::FlowState;
use crate::store::kv::{Expected, KeyValueStore, StoreResult};
use crate::store::records::{
    pending_key, result_key, session_key, PendingReference, TaskRecord,
};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct FlowConfig {
    /// Session state lifetime; idle flows older than this reset to the start
    pub session_ttl: Duration,
    /// How long a pre-flow input stays parked
    pub pending_ttl: Duration,
    /// How long a task record (and its result) stays claimable
    pub result_ttl: Duration,
    /// Composition lock lifetime; bounds how long a crashed worker can
    /// block a user
    pub lock_ttl: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(6 * 60 * 60),
            pending_ttl: Duration::from_secs(10 * 60),
            result_ttl: Duration::from_secs(30 * 60),
            lock_ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl FlowConfig {
    /// Build from `PAIRFLOW_*_TTL_SECS` env vars, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            session_ttl: env_secs("PAIRFLOW_SESSION_TTL_SECS", defaults.session_ttl),
            pending_ttl: env_secs("PAIRFLOW_PENDING_TTL_SECS", defaults.pending_ttl),
            result_ttl: env_secs("PAIRFLOW_RESULT_TTL_SECS", defaults.result_ttl),
            lock_ttl: env_secs("PAIRFLOW_LOCK_TTL_SECS", defaults.lock_ttl),
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                warn!(var = name, value = %raw, "ignoring unparseable TTL override");
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Clone)]
pub struct FlowStore<S> {
    store: S,
    config: FlowConfig,
}

impl<S: KeyValueStore + Clone> FlowStore<S> {
    pub fn new(store: S, config: FlowConfig) -> Self {
        Self { store, config }
    }

    /// Current session state; absent or unparseable reads as the initial
    /// state. Unparseable means the serialized shape changed across a
    /// deploy, and restarting the flow is the safe recovery.
    pub async fn state(&self, user_id: &str) -> StoreResult<FlowState> {
        let raw = self.store.get(&session_key(user_id)).await?;
        Ok(raw
            .and_then(|json| {
                serde_json::from_str(&json)
                    .map_err(|err| {
                        warn!(user_id, %err, "discarding unreadable session state");
                        err
                    })
                    .ok()
            })
            .unwrap_or_default())
    }

    /// Guarded transition: apply `to` only if the stored state is still the
    /// `from` the caller observed. An absent key matches `from == Idle`.
    pub async fn transition_state(
        &self,
        user_id: &str,
        from: FlowState,
        to: FlowState,
    ) -> StoreResult<bool> {
        let from_json = serde_json::to_string(&from).expect("state serializes");
        let to_json = serde_json::to_string(&to).expect("state serializes");
        let expected = if from == FlowState::Idle {
            Expected::AbsentOr(&from_json)
        } else {
            Expected::Value(&from_json)
        };
        self.store
            .compare_and_set(&session_key(user_id), expected, &to_json, self.config.session_ttl)
            .await
    }

    /// Unconditional state write; only the clear family uses this.
    pub async fn reset_state(&self, user_id: &str, to: FlowState) -> StoreResult<()> {
        let to_json = serde_json::to_string(&to).expect("state serializes");
        self.store
            .set(&session_key(user_id), &to_json, self.config.session_ttl)
            .await
    }

    pub async fn pending(&self, user_id: &str) -> StoreResult<Option<PendingReference>> {
        let raw = self.store.get(&pending_key(user_id)).await?;
        Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
    }

    pub async fn store_pending(
        &self,
        user_id: &str,
        pending: &PendingReference,
    ) -> StoreResult<()> {
        let json = serde_json::to_string(pending).expect("pending serializes");
        self.store
            .set(&pending_key(user_id), &json, self.config.pending_ttl)
            .await
    }

    pub async fn clear_pending(&self, user_id: &str) -> StoreResult<()> {
        self.store.delete(&pending_key(user_id)).await
    }

    pub async fn task(&self, user_id: &str) -> StoreResult<Option<TaskRecord>> {
        let raw = self.store.get(&result_key(user_id)).await?;
        Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
    }

    /// Write the in-flight record and return its exact serialization. The
    /// worker passes that string back to `finish_task` as its fencing
    /// token.
    pub async fn start_task(&self, user_id: &str, record: &TaskRecord) -> StoreResult<String> {
        let json = serde_json::to_string(record).expect("task record serializes");
        self.store
            .set(&result_key(user_id), &json, self.config.result_ttl)
            .await?;
        Ok(json)
    }

    /// Fenced terminal write: lands only if the stored record is still the
    /// one this worker started with. Returns false when the task was
    /// cleared or superseded, in which case the result must be discarded.
    pub async fn finish_task(
        &self,
        user_id: &str,
        prior: &str,
        record: &TaskRecord,
    ) -> StoreResult<bool> {
        let json = serde_json::to_string(record).expect("task record serializes");
        self.store
            .compare_and_set(
                &result_key(user_id),
                Expected::Value(prior),
                &json,
                self.config.result_ttl,
            )
            .await
    }

    pub async fn clear_task(&self, user_id: &str) -> StoreResult<()> {
        self.store.delete(&result_key(user_id)).await
    }
}

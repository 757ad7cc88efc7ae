//! Detached composition tasks
//!
//! The coordinator owns the bridge from "both inputs present" to "result
//! ready": it takes the per-user composition lock, records the in-flight
//! task, and spawns a worker that survives the triggering event handler.
//! The handler only ever learns whether the task started.

use crate::compose::ComposeService;
use crate::flow::{FlowState, InputSlot};
use crate::store::kv::{KeyValueStore, StoreResult};
use crate::store::lock::LockManager;
use crate::store::records::TaskRecord;
use crate::store::FlowStore;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Lock operation name for composition; one task per user at a time
pub const SYNTHESIS_OPERATION: &str = "synthesis";

pub struct ComposeCoordinator<S, C> {
    store: FlowStore<S>,
    locks: LockManager<S>,
    compose: Arc<C>,
}

impl<S, C> Clone for ComposeCoordinator<S, C>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            locks: self.locks.clone(),
            compose: self.compose.clone(),
        }
    }
}

impl<S, C> ComposeCoordinator<S, C>
where
    S: KeyValueStore + Clone + 'static,
    C: ComposeService + 'static,
{
    pub fn new(store: FlowStore<S>, locks: LockManager<S>, compose: Arc<C>) -> Self {
        Self {
            store,
            locks,
            compose,
        }
    }

    /// Start a composition task for `user_id`. Returns false when a task
    /// already holds the user's composition lock.
    ///
    /// The in-flight record is written before this returns, so a result
    /// poll arriving immediately after sees a processing task rather than
    /// an absent record.
    pub async fn start(&self, user_id: &str, trigger: InputSlot) -> StoreResult<bool> {
        // The task id doubles as the lock fencing token, so a superseded
        // worker can never free a lock a newer task holds
        let record = TaskRecord::processing(trigger);
        let token = record.task_id.to_string();
        if !self.locks.acquire(user_id, SYNTHESIS_OPERATION, &token).await? {
            info!(user_id, "composition already in flight");
            return Ok(false);
        }

        let prior = match self.store.start_task(user_id, &record).await {
            Ok(prior) => prior,
            Err(err) => {
                // Nothing is running; leave the lock free for a retry
                if let Err(release_err) =
                    self.locks.release(user_id, SYNTHESIS_OPERATION, &token).await
                {
                    warn!(user_id, %release_err, "failed to release lock after store error");
                }
                return Err(err);
            }
        };

        info!(user_id, task_id = %record.task_id, %trigger, "composition started");
        let coordinator = self.clone();
        let user = user_id.to_string();
        self.locks
            .spawn_guarded(user_id, SYNTHESIS_OPERATION, token, async move {
                coordinator.run_task(&user, record, &prior).await;
            });
        Ok(true)
    }

    async fn run_task(&self, user_id: &str, record: TaskRecord, prior: &str) {
        let terminal = match self.compose.compose(user_id).await {
            Ok(result_ref) => record.completed(result_ref),
            Err(err) => {
                warn!(user_id, %err, "composition failed");
                record.failed(err.to_string())
            }
        };

        let trigger = terminal.trigger;
        let landed = match self.store.finish_task(user_id, prior, &terminal).await {
            Ok(landed) => landed,
            Err(err) => {
                error!(user_id, %err, "failed to store composition outcome");
                return;
            }
        };
        if !landed {
            // The record was cleared or replaced while we ran; a newer
            // owner will write its own outcome
            warn!(user_id, task_id = %terminal.task_id, "task superseded; discarding late result");
            return;
        }

        let moved = match self
            .store
            .transition_state(user_id, FlowState::Processing, FlowState::result_ready(trigger))
            .await
        {
            Ok(moved) => moved,
            Err(err) => {
                error!(user_id, %err, "failed to advance state after composition");
                return;
            }
        };
        if moved {
            info!(user_id, task_id = %terminal.task_id, "composition finished");
        } else {
            // The user moved on (clear, restart); the result stays
            // claimable via polling until its TTL
            warn!(user_id, "session left processing before composition finished");
        }
    }
}

//! Serialized record shapes and the key namespace
//!
//! Everything persisted for a user lives under a handful of namespaced
//! keys; the record types here are the values. Per-user data never shares
//! a key across users, so user flows cannot observe each other.

use crate::flow::InputSlot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn session_key(user_id: &str) -> String {
    format!("session:{user_id}")
}

pub fn pending_key(user_id: &str) -> String {
    format!("pending:{user_id}")
}

pub fn result_key(user_id: &str) -> String {
    format!("result:{user_id}")
}

pub fn input_key(user_id: &str, slot: InputSlot) -> String {
    format!("input:{user_id}:{slot}")
}

pub fn lock_key(user_id: &str, operation: &str) -> String {
    format!("lock:{user_id}:{operation}")
}

/// An input that arrived before the flow started; parked until the user
/// starts, then consumed as input A.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReference {
    pub artifact_ref: String,
    pub received_at: DateTime<Utc>,
}

impl PendingReference {
    pub fn new(artifact_ref: impl Into<String>) -> Self {
        Self {
            artifact_ref: artifact_ref.into(),
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Processing,
    Completed { result_ref: String },
    Failed { error: String },
}

/// One composition task's lifecycle record. The `task_id` ties a terminal
/// write back to the exact task that produced it; a worker that finds a
/// different record in the store is stale and must discard its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub trigger: InputSlot,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn processing(trigger: InputSlot) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            trigger,
            status: TaskStatus::Processing,
            started_at: Utc::now(),
        }
    }

    /// Terminal success record for the same task
    #[must_use]
    pub fn completed(self, result_ref: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Completed {
                result_ref: result_ref.into(),
            },
            ..self
        }
    }

    /// Terminal failure record for the same task
    #[must_use]
    pub fn failed(self, error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed {
                error: error.into(),
            },
            ..self
        }
    }

    #[allow(dead_code)] // assertion helper for tests
    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, TaskStatus::Processing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_user() {
        assert_eq!(session_key("u1"), "session:u1");
        assert_eq!(pending_key("u1"), "pending:u1");
        assert_eq!(result_key("u1"), "result:u1");
        assert_eq!(input_key("u1", InputSlot::A), "input:u1:a");
        assert_eq!(input_key("u1", InputSlot::B), "input:u1:b");
        assert_eq!(lock_key("u1", "synthesis"), "lock:u1:synthesis");
    }

    #[test]
    fn terminal_records_keep_the_task_identity() {
        let record = TaskRecord::processing(InputSlot::B);
        let done = record.clone().completed("result-1");
        assert_eq!(done.task_id, record.task_id);
        assert_eq!(done.trigger, InputSlot::B);
        assert!(done.is_terminal());
        assert!(!record.is_terminal());

        let failed = record.clone().failed("upstream 503");
        assert_eq!(failed.task_id, record.task_id);
        assert_eq!(
            failed.status,
            TaskStatus::Failed {
                error: "upstream 503".to_string()
            }
        );
    }

    #[test]
    fn task_record_roundtrips_through_json() {
        let record = TaskRecord::processing(InputSlot::A).completed("r");
        let json = serde_json::to_string(&record).unwrap();
        let parsed: TaskRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}

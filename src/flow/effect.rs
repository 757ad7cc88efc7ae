//! Effects and reply-intents produced by transitions

use super::state::{FlowState, InputSlot};
use serde::Serialize;

/// Outbound reply-intent, consumed by a presentation collaborator.
///
/// The core never renders transport payloads or localized text; `Reminder`
/// carries the current state so the presentation layer can phrase the
/// expected action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyIntent {
    RequestInput { slot: InputSlot },
    StillProcessing,
    ResultReady { result_ref: String },
    /// An operation for this user is already in progress
    Busy,
    Error { reason: String },
    Welcome,
    /// An artifact was parked pending slot classification
    PendingSaved,
    Reminder { state: FlowState },
}

/// Store-side effects to execute after a transition is applied.
///
/// None of these run when the state CAS loses; a concurrent event already
/// advanced the flow and owns the side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Persist an artifact ref into a slot
    SaveInput {
        slot: InputSlot,
        artifact_ref: String,
    },
    /// Park an artifact whose slot is not yet known
    StorePending { artifact_ref: String },
    ClearPending,
    ClearInput { slot: InputSlot },
    /// Delete the task record
    ClearResult,
    /// Delete every per-user record and release the synthesis lock
    ClearAll,
    /// Start the background composition task
    StartCompose { trigger: InputSlot },
}

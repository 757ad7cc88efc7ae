//! Flow state types

use crate::store::records::{PendingReference, TaskRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two input slots an artifact fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSlot {
    A,
    B,
}

impl InputSlot {
    /// The slot paired with this one
    pub fn other(self) -> Self {
        match self {
            InputSlot::A => InputSlot::B,
            InputSlot::B => InputSlot::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InputSlot::A => "a",
            InputSlot::B => "b",
        }
    }
}

impl fmt::Display for InputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user flow state.
///
/// Absent from the store means `Idle`; the two result-ready variants record
/// which input completed the pair, so a later re-upload command knows which
/// slot it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowState {
    #[default]
    Idle,
    AwaitingA,
    AwaitingB,
    Processing,
    ResultReadyFromA,
    ResultReadyFromB,
}

impl FlowState {
    /// The awaiting state for a slot
    pub fn awaiting(slot: InputSlot) -> Self {
        match slot {
            InputSlot::A => FlowState::AwaitingA,
            InputSlot::B => FlowState::AwaitingB,
        }
    }

    /// The result-ready state entered when `trigger` completed the pair
    pub fn result_ready(trigger: InputSlot) -> Self {
        match trigger {
            InputSlot::A => FlowState::ResultReadyFromA,
            InputSlot::B => FlowState::ResultReadyFromB,
        }
    }

    /// Check if a result is ready (either trigger variant)
    pub fn is_result_ready(self) -> bool {
        matches!(
            self,
            FlowState::ResultReadyFromA | FlowState::ResultReadyFromB
        )
    }
}

/// I/O snapshot assembled by the router before each transition.
///
/// The transition function itself never touches the store; every fact it
/// conditions on is captured here.
#[derive(Debug, Clone, Default)]
pub struct FlowContext {
    /// Input A is stored for this user
    pub has_a: bool,
    /// Input B is stored for this user
    pub has_b: bool,
    /// Artifact parked before its slot classification was known
    pub pending: Option<PendingReference>,
    /// Current background task record, if any
    pub task: Option<TaskRecord>,
}

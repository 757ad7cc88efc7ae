//! Pure flow transition function
//!
//! Given the same state, context snapshot, and event, this always produces
//! the same result, with no I/O. The router applies the state change through
//! a compare-and-set and only then executes the effects.

use super::effect::{Effect, ReplyIntent};
use super::event::{CommandId, FlowEvent};
use super::state::{FlowContext, FlowState, InputSlot};
use crate::store::records::TaskStatus;

/// Result of a flow transition
#[derive(Debug)]
pub struct TransitionResult {
    /// New state, or `None` for no transition (and no state-changing effects)
    pub next: Option<FlowState>,
    /// When false the state write skips the CAS guard; the clear-family
    /// commands apply from any state and are written unconditionally.
    pub guarded: bool,
    /// Exactly one reply-intent per inbound event
    pub reply: ReplyIntent,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn reply(reply: ReplyIntent) -> Self {
        Self {
            next: None,
            guarded: true,
            reply,
            effects: vec![],
        }
    }

    pub fn to(mut self, state: FlowState) -> Self {
        self.next = Some(state);
        self
    }

    pub fn unguarded(mut self) -> Self {
        self.guarded = false;
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Pure transition function
pub fn transition(state: FlowState, ctx: &FlowContext, event: FlowEvent) -> TransitionResult {
    match (state, event) {
        // ============================================================
        // Session greeting - works from any state, changes nothing
        // ============================================================
        (_, FlowEvent::SessionStart) => TransitionResult::reply(ReplyIntent::Welcome),

        // ============================================================
        // Starting a pairing
        // ============================================================
        (FlowState::Idle, FlowEvent::Start) => start_from_idle(ctx),

        // Input before Start: slot classification is ambiguous, park it
        (FlowState::Idle, FlowEvent::InputReceived { artifact_ref }) => {
            TransitionResult::reply(ReplyIntent::PendingSaved)
                .with_effect(Effect::StorePending { artifact_ref })
        }

        // ============================================================
        // Input classification
        // ============================================================
        (FlowState::AwaitingA, FlowEvent::InputReceived { artifact_ref }) => {
            classify(InputSlot::A, artifact_ref, ctx.has_b)
        }
        (FlowState::AwaitingB, FlowEvent::InputReceived { artifact_ref }) => {
            classify(InputSlot::B, artifact_ref, ctx.has_a)
        }

        // ============================================================
        // Polling for results
        // ============================================================
        (FlowState::Processing, FlowEvent::Command(CommandId::CheckResult)) => {
            check_while_processing(ctx)
        }
        (s, FlowEvent::Command(CommandId::CheckResult)) if s.is_result_ready() => deliver(ctx),

        // ============================================================
        // Result-ready commands
        // ============================================================
        (FlowState::ResultReadyFromA, FlowEvent::Command(CommandId::Regenerate)) => {
            regenerate(InputSlot::A, ctx)
        }
        (FlowState::ResultReadyFromB, FlowEvent::Command(CommandId::Regenerate)) => {
            regenerate(InputSlot::B, ctx)
        }
        (s, FlowEvent::Command(CommandId::ReuploadA)) if s.is_result_ready() => {
            reupload(InputSlot::A)
        }
        (s, FlowEvent::Command(CommandId::ReuploadB)) if s.is_result_ready() => {
            reupload(InputSlot::B)
        }

        // ============================================================
        // Clear-family commands - valid from any state, unguarded writes
        // ============================================================
        (_, FlowEvent::Command(CommandId::ClearA)) => clear_slot(InputSlot::A),
        (_, FlowEvent::Command(CommandId::ClearB)) => clear_slot(InputSlot::B),
        (_, FlowEvent::Command(CommandId::ClearAll)) => {
            TransitionResult::reply(ReplyIntent::RequestInput { slot: InputSlot::A })
                .to(FlowState::AwaitingA)
                .unguarded()
                .with_effect(Effect::ClearAll)
        }

        // ============================================================
        // Unknown commands and anything unexpected for the current state
        // ============================================================
        (state, _) => TransitionResult::reply(ReplyIntent::Reminder { state }),
    }
}

fn start_from_idle(ctx: &FlowContext) -> TransitionResult {
    match &ctx.pending {
        // Normal path: ask for input A
        None => TransitionResult::reply(ReplyIntent::RequestInput { slot: InputSlot::A })
            .to(FlowState::AwaitingA),
        // A parked artifact becomes input A now that the pairing started
        Some(pending) if ctx.has_b => TransitionResult::reply(ReplyIntent::StillProcessing)
            .to(FlowState::Processing)
            .with_effect(Effect::SaveInput {
                slot: InputSlot::A,
                artifact_ref: pending.artifact_ref.clone(),
            })
            .with_effect(Effect::ClearPending)
            .with_effect(Effect::StartCompose {
                trigger: InputSlot::A,
            }),
        Some(pending) => TransitionResult::reply(ReplyIntent::RequestInput { slot: InputSlot::B })
            .to(FlowState::AwaitingB)
            .with_effect(Effect::SaveInput {
                slot: InputSlot::A,
                artifact_ref: pending.artifact_ref.clone(),
            })
            .with_effect(Effect::ClearPending),
    }
}

fn classify(slot: InputSlot, artifact_ref: String, other_present: bool) -> TransitionResult {
    if other_present {
        // This input completed the pair: it is the trigger
        TransitionResult::reply(ReplyIntent::StillProcessing)
            .to(FlowState::Processing)
            .with_effect(Effect::SaveInput { slot, artifact_ref })
            .with_effect(Effect::StartCompose { trigger: slot })
    } else {
        TransitionResult::reply(ReplyIntent::RequestInput { slot: slot.other() })
            .to(FlowState::awaiting(slot.other()))
            .with_effect(Effect::SaveInput { slot, artifact_ref })
    }
}

fn check_while_processing(ctx: &FlowContext) -> TransitionResult {
    match &ctx.task {
        // Record expired or never written (crash before the first write):
        // unwedge instead of polling forever
        None => TransitionResult::reply(ReplyIntent::Error {
            reason: "result expired".to_string(),
        })
        .to(FlowState::Idle),
        Some(task) => match &task.status {
            TaskStatus::Processing => TransitionResult::reply(ReplyIntent::StillProcessing),
            // Poll landed between the coordinator's record write and its
            // state CAS; deliver rather than claim "still working"
            TaskStatus::Completed { result_ref } => {
                TransitionResult::reply(ReplyIntent::ResultReady {
                    result_ref: result_ref.clone(),
                })
                .to(FlowState::Idle)
                .with_effect(Effect::ClearResult)
            }
            TaskStatus::Failed { error } => TransitionResult::reply(ReplyIntent::Error {
                reason: error.clone(),
            })
            .to(FlowState::result_ready(task.trigger)),
        },
    }
}

fn deliver(ctx: &FlowContext) -> TransitionResult {
    match &ctx.task {
        None => TransitionResult::reply(ReplyIntent::Error {
            reason: "result expired".to_string(),
        })
        .to(FlowState::Idle),
        Some(task) => match &task.status {
            TaskStatus::Completed { result_ref } => {
                TransitionResult::reply(ReplyIntent::ResultReady {
                    result_ref: result_ref.clone(),
                })
                .to(FlowState::Idle)
                .with_effect(Effect::ClearResult)
            }
            TaskStatus::Failed { error } => TransitionResult::reply(ReplyIntent::Error {
                reason: error.clone(),
            })
            .to(FlowState::Idle)
            .with_effect(Effect::ClearResult),
            // Record lagging behind the state; keep polling
            TaskStatus::Processing => TransitionResult::reply(ReplyIntent::StillProcessing),
        },
    }
}

fn regenerate(trigger: InputSlot, ctx: &FlowContext) -> TransitionResult {
    if !ctx.has_a {
        // Input expired since the last run; ask for it again
        TransitionResult::reply(ReplyIntent::RequestInput { slot: InputSlot::A })
            .to(FlowState::AwaitingA)
            .with_effect(Effect::ClearResult)
    } else if !ctx.has_b {
        TransitionResult::reply(ReplyIntent::RequestInput { slot: InputSlot::B })
            .to(FlowState::AwaitingB)
            .with_effect(Effect::ClearResult)
    } else {
        TransitionResult::reply(ReplyIntent::StillProcessing)
            .to(FlowState::Processing)
            .with_effect(Effect::ClearResult)
            .with_effect(Effect::StartCompose { trigger })
    }
}

fn reupload(slot: InputSlot) -> TransitionResult {
    TransitionResult::reply(ReplyIntent::RequestInput { slot })
        .to(FlowState::awaiting(slot))
        .with_effect(Effect::ClearInput { slot })
        .with_effect(Effect::ClearResult)
}

fn clear_slot(slot: InputSlot) -> TransitionResult {
    TransitionResult::reply(ReplyIntent::RequestInput { slot })
        .to(FlowState::awaiting(slot))
        .unguarded()
        .with_effect(Effect::ClearInput { slot })
        .with_effect(Effect::ClearResult)
}

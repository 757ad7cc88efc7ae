//! Property-based tests for the flow transition function
//!
//! These verify key invariants hold across all possible inputs.

#![allow(clippy::similar_names)]

use super::effect::{Effect, ReplyIntent};
use super::event::{CommandId, FlowEvent};
use super::state::{FlowContext, FlowState, InputSlot};
use super::transition::transition;
use crate::store::records::{PendingReference, TaskRecord};
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_slot() -> impl Strategy<Value = InputSlot> {
    prop_oneof![Just(InputSlot::A), Just(InputSlot::B)]
}

fn arb_state() -> impl Strategy<Value = FlowState> {
    prop_oneof![
        Just(FlowState::Idle),
        Just(FlowState::AwaitingA),
        Just(FlowState::AwaitingB),
        Just(FlowState::Processing),
        Just(FlowState::ResultReadyFromA),
        Just(FlowState::ResultReadyFromB),
    ]
}

fn arb_command() -> impl Strategy<Value = CommandId> {
    prop_oneof![
        Just(CommandId::CheckResult),
        Just(CommandId::Regenerate),
        Just(CommandId::ReuploadA),
        Just(CommandId::ReuploadB),
        Just(CommandId::ClearA),
        Just(CommandId::ClearB),
        Just(CommandId::ClearAll),
        Just(CommandId::Unknown),
    ]
}

fn arb_task() -> impl Strategy<Value = TaskRecord> {
    (arb_slot(), 0u8..3, "[a-z0-9]{1,12}").prop_map(|(trigger, kind, payload)| {
        let record = TaskRecord::processing(trigger);
        match kind {
            0 => record,
            1 => record.completed(payload),
            _ => record.failed(payload),
        }
    })
}

fn arb_ctx() -> impl Strategy<Value = FlowContext> {
    (
        any::<bool>(),
        any::<bool>(),
        proptest::option::of("[a-z0-9]{1,12}"),
        proptest::option::of(arb_task()),
    )
        .prop_map(|(has_a, has_b, pending, task)| FlowContext {
            has_a,
            has_b,
            pending: pending.map(PendingReference::new),
            task,
        })
}

fn arb_event() -> impl Strategy<Value = FlowEvent> {
    prop_oneof![
        Just(FlowEvent::Start),
        Just(FlowEvent::SessionStart),
        "[a-z0-9]{1,12}".prop_map(|artifact_ref| FlowEvent::InputReceived { artifact_ref }),
        arb_command().prop_map(FlowEvent::Command),
    ]
}

// ============================================================================
// Invariants
// ============================================================================

proptest! {
    /// CLEAR_ALL always restarts the flow at AwaitingA with a full wipe,
    /// regardless of state or context.
    #[test]
    fn clear_all_always_restarts(state in arb_state(), ctx in arb_ctx()) {
        let result = transition(state, &ctx, FlowEvent::Command(CommandId::ClearAll));
        prop_assert_eq!(result.next, Some(FlowState::AwaitingA));
        prop_assert!(!result.guarded);
        prop_assert_eq!(result.effects, vec![Effect::ClearAll]);
    }

    /// Unknown commands never change state and never carry effects.
    #[test]
    fn unknown_command_is_inert(state in arb_state(), ctx in arb_ctx()) {
        let result = transition(state, &ctx, FlowEvent::Command(CommandId::Unknown));
        prop_assert_eq!(result.next, None);
        prop_assert!(result.effects.is_empty());
        prop_assert_eq!(result.reply, ReplyIntent::Reminder { state });
    }

    /// SessionStart greets and changes nothing, from any state.
    #[test]
    fn session_start_is_pure_greeting(state in arb_state(), ctx in arb_ctx()) {
        let result = transition(state, &ctx, FlowEvent::SessionStart);
        prop_assert_eq!(result.next, None);
        prop_assert!(result.effects.is_empty());
        prop_assert_eq!(result.reply, ReplyIntent::Welcome);
    }

    /// The composition task is only ever fired on the way into Processing.
    #[test]
    fn compose_fires_only_entering_processing(
        state in arb_state(),
        ctx in arb_ctx(),
        event in arb_event(),
    ) {
        let result = transition(state, &ctx, event);
        let fires = result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::StartCompose { .. }));
        if fires {
            prop_assert_eq!(result.next, Some(FlowState::Processing));
        }
    }

    /// A no-op transition never carries state-mutating effects; effects are
    /// owned by whichever event actually advanced the state. Parking a
    /// pending artifact is the one idempotent exception.
    #[test]
    fn noop_transitions_have_no_destructive_effects(
        state in arb_state(),
        ctx in arb_ctx(),
        event in arb_event(),
    ) {
        let result = transition(state, &ctx, event);
        if result.next.is_none() {
            for effect in &result.effects {
                prop_assert!(
                    matches!(effect, Effect::StorePending { .. }),
                    "destructive effect on a no-op transition"
                );
            }
        }
    }

    /// Unguarded writes are exclusive to the clear-family commands.
    #[test]
    fn only_clear_family_skips_the_cas_guard(
        state in arb_state(),
        ctx in arb_ctx(),
        event in arb_event(),
    ) {
        let clear_family = matches!(
            event,
            FlowEvent::Command(CommandId::ClearA | CommandId::ClearB | CommandId::ClearAll)
        );
        let result = transition(state, &ctx, event);
        if !result.guarded {
            prop_assert!(clear_family);
        }
    }
}

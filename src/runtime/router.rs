//! Event routing: validate, snapshot, transition, apply
//!
//! One inbound event produces exactly one reply intent. The state write is
//! a compare-and-set against the snapshot this handler read; when a
//! concurrent handler wins the race, this one replies busy and applies no
//! effects.

use crate::compose::ComposeService;
use crate::flow::{
    transition, CommandId, Effect, FlowContext, FlowEvent, InboundEvent, InboundEventKind,
    InputSlot, ReplyIntent,
};
use crate::runtime::coordinator::{ComposeCoordinator, SYNTHESIS_OPERATION};
use crate::store::kv::{KeyValueStore, StoreError};
use crate::store::lock::LockManager;
use crate::store::records::PendingReference;
use crate::store::{FlowStore, InputStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct EventRouter<S, C, I> {
    store: FlowStore<S>,
    locks: LockManager<S>,
    inputs: Arc<I>,
    coordinator: ComposeCoordinator<S, C>,
}

impl<S, C, I> EventRouter<S, C, I>
where
    S: KeyValueStore + Clone + 'static,
    C: ComposeService + 'static,
    I: InputStore,
{
    pub fn new(
        store: FlowStore<S>,
        locks: LockManager<S>,
        inputs: Arc<I>,
        coordinator: ComposeCoordinator<S, C>,
    ) -> Self {
        Self {
            store,
            locks,
            inputs,
            coordinator,
        }
    }

    /// Handle one inbound event. Store failures bubble as errors so the
    /// transport can signal the event for redelivery.
    pub async fn handle(&self, event: &InboundEvent) -> Result<ReplyIntent, RouterError> {
        let flow_event = validate(event)?;
        let user_id = event.user_id.as_str();

        let state = self.store.state(user_id).await?;
        let ctx = self.snapshot(user_id).await?;
        let result = transition(state, &ctx, flow_event);
        debug!(
            user_id,
            reply_handle = %event.reply_handle,
            ?state,
            next = ?result.next,
            "transition computed"
        );

        if let Some(next) = result.next {
            let applied = if result.guarded {
                self.store.transition_state(user_id, state, next).await?
            } else {
                self.store.reset_state(user_id, next).await?;
                true
            };
            if !applied {
                // A concurrent handler moved the session first
                info!(user_id, ?state, "state changed underneath handler");
                return Ok(ReplyIntent::Busy);
            }
        }

        let mut reply = result.reply;
        for effect in result.effects {
            if let Some(override_reply) = self.apply(user_id, effect).await? {
                reply = override_reply;
            }
        }
        Ok(reply)
    }

    async fn snapshot(&self, user_id: &str) -> Result<FlowContext, RouterError> {
        let refs = self.inputs.input_refs(user_id).await?;
        Ok(FlowContext {
            has_a: refs.a.is_some(),
            has_b: refs.b.is_some(),
            pending: self.store.pending(user_id).await?,
            task: self.store.task(user_id).await?,
        })
    }

    /// Execute one effect; returns a reply override when the effect's
    /// outcome changes what the user should hear.
    async fn apply(&self, user_id: &str, effect: Effect) -> Result<Option<ReplyIntent>, RouterError> {
        match effect {
            Effect::SaveInput { slot, artifact_ref } => {
                self.inputs.save_input(user_id, slot, &artifact_ref).await?;
            }
            Effect::StorePending { artifact_ref } => {
                let pending = PendingReference::new(artifact_ref);
                self.store.store_pending(user_id, &pending).await?;
            }
            Effect::ClearPending => {
                self.store.clear_pending(user_id).await?;
            }
            Effect::ClearInput { slot } => {
                self.inputs.clear_input(user_id, slot).await?;
            }
            Effect::ClearResult => {
                self.store.clear_task(user_id).await?;
            }
            Effect::ClearAll => {
                // The session key is not deleted; the state write above
                // already placed the session at the restart point
                self.store.clear_pending(user_id).await?;
                self.store.clear_task(user_id).await?;
                self.inputs.clear_input(user_id, InputSlot::A).await?;
                self.inputs.clear_input(user_id, InputSlot::B).await?;
                // Unfenced on purpose: the reset must free the lock no
                // matter which worker holds it
                self.locks.force_release(user_id, SYNTHESIS_OPERATION).await?;
            }
            Effect::StartCompose { trigger } => {
                if !self.coordinator.start(user_id, trigger).await? {
                    return Ok(Some(ReplyIntent::Busy));
                }
            }
        }
        Ok(None)
    }
}

fn validate(event: &InboundEvent) -> Result<FlowEvent, RouterError> {
    if event.user_id.is_empty() {
        return Err(RouterError::InvalidEvent("missing user_id".to_string()));
    }
    match event.kind {
        InboundEventKind::Start => Ok(FlowEvent::Start),
        InboundEventKind::InputReceived => {
            let artifact_ref = event
                .artifact_ref
                .clone()
                .filter(|r| !r.is_empty())
                .ok_or_else(|| {
                    RouterError::InvalidEvent("input event without artifact_ref".to_string())
                })?;
            Ok(FlowEvent::InputReceived { artifact_ref })
        }
        InboundEventKind::TextCommand => {
            Ok(FlowEvent::Command(event.command.unwrap_or(CommandId::Unknown)))
        }
        InboundEventKind::SessionStart => Ok(FlowEvent::SessionStart),
    }
}

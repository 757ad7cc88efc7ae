//! Two-input composition flow state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions: all
//! I/O facts arrive in a `FlowContext` snapshot, all side effects leave as
//! `Effect` values for the runtime to execute.

pub mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, ReplyIntent};
pub use event::{CommandId, FlowEvent, InboundEvent, InboundEventKind};
pub use state::{FlowContext, FlowState, InputSlot};
pub use transition::{transition, TransitionResult};

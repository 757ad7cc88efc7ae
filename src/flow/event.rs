//! Events that drive the flow

use serde::{Deserialize, Serialize};

/// Text commands recognized by the flow.
///
/// Unrecognized command ids deserialize to `Unknown` so a newer transport
/// never fails the whole event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandId {
    CheckResult,
    Regenerate,
    ReuploadA,
    ReuploadB,
    ClearA,
    ClearB,
    ClearAll,
    #[serde(other)]
    Unknown,
}

/// Events that trigger flow transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// User asked to begin a new pairing
    Start,
    /// An input artifact arrived (slot decided by current state)
    InputReceived { artifact_ref: String },
    /// A recognized (or unknown) text command
    Command(CommandId),
    /// New-user greeting
    SessionStart,
}

/// Discriminator for normalized inbound events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundEventKind {
    Start,
    InputReceived,
    TextCommand,
    SessionStart,
}

/// A normalized inbound event from the transport collaborator.
///
/// Signature validation and payload parsing happened upstream; this is the
/// already-validated shape the core consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub kind: InboundEventKind,
    pub user_id: String,
    /// Opaque handle the presentation collaborator replies through
    pub reply_handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandId>,
}

// Shorthand constructors for tests; production events arrive as JSON
#[cfg(test)]
impl InboundEvent {
    pub fn start(user_id: impl Into<String>) -> Self {
        Self {
            kind: InboundEventKind::Start,
            user_id: user_id.into(),
            reply_handle: String::new(),
            artifact_ref: None,
            command: None,
        }
    }

    pub fn input(user_id: impl Into<String>, artifact_ref: impl Into<String>) -> Self {
        Self {
            kind: InboundEventKind::InputReceived,
            user_id: user_id.into(),
            reply_handle: String::new(),
            artifact_ref: Some(artifact_ref.into()),
            command: None,
        }
    }

    pub fn command(user_id: impl Into<String>, command: CommandId) -> Self {
        Self {
            kind: InboundEventKind::TextCommand,
            user_id: user_id.into(),
            reply_handle: String::new(),
            artifact_ref: None,
            command: Some(command),
        }
    }

    pub fn session_start(user_id: impl Into<String>) -> Self {
        Self {
            kind: InboundEventKind::SessionStart,
            user_id: user_id.into(),
            reply_handle: String::new(),
            artifact_ref: None,
            command: None,
        }
    }
}

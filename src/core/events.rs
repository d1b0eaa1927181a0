//! Session event model.
//!
//! Every message crossing the bridge is represented as an [`Event`]: an
//! immutable pair of a per-session sequence number and an [`EventKind`].
//! Sequence numbers are stamped by the session coordinator when it accepts
//! an event for routing, so they are strictly increasing within a session.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Event envelope
// =============================================================================

/// An immutable, sequenced event routed by a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    sequence: u64,
    kind: EventKind,
}

impl Event {
    pub fn new(sequence: u64, kind: EventKind) -> Self {
        Self { sequence, kind }
    }

    /// Monotonic per-session sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[inline]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn into_kind(self) -> EventKind {
        self.kind
    }
}

/// Payload of an [`Event`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Produced by the client.
    ClientMessage(ClientMessage),
    /// Produced by the upstream service (tool calls excluded).
    UpstreamMessage(UpstreamMessage),
    /// Upstream asks the bridge to run a tool.
    ToolCallRequest(ToolCallRequest),
    /// Outcome of a tool invocation.
    ToolCallResult(ToolCallResult),
    /// Generated by the bridge itself.
    SessionControl(SessionControl),
}

impl EventKind {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::ClientMessage(_) => "client_message",
            EventKind::UpstreamMessage(_) => "upstream_message",
            EventKind::ToolCallRequest(_) => "tool_call_request",
            EventKind::ToolCallResult(_) => "tool_call_result",
            EventKind::SessionControl(_) => "session_control",
        }
    }
}

// =============================================================================
// Peers and roles
// =============================================================================

/// The two remote parties of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Peer {
    Client,
    Upstream,
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Client => write!(f, "client"),
            Peer::Upstream => write!(f, "upstream"),
        }
    }
}

/// Speaker role attached to text and transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    System,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::System => "system",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Client messages
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// A text turn. User text triggers a response, system text does not.
    Text { role: Role, text: String },
    /// Raw PCM16 audio.
    Audio(Bytes),
    TurnControl(TurnControl),
    /// A raw upstream-protocol object forwarded verbatim.
    Passthrough(serde_json::Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnControl {
    CommitAudio,
    ClearAudio,
    CreateResponse,
    CancelResponse,
}

// =============================================================================
// Upstream messages
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamMessage {
    /// Base64 encoded PCM16 chunk, forwarded without re-encoding.
    AudioDelta {
        response_id: Option<String>,
        item_id: Option<String>,
        delta: String,
    },
    TextDone {
        response_id: Option<String>,
        item_id: Option<String>,
        text: String,
    },
    Transcript {
        role: Role,
        text: String,
        item_id: Option<String>,
    },
    SpeechStarted {
        audio_start_ms: u64,
        item_id: Option<String>,
    },
    SpeechStopped {
        audio_end_ms: u64,
        item_id: Option<String>,
    },
    /// `response.done`
    TurnComplete {
        response_id: Option<String>,
        status: Option<String>,
    },
    Error {
        code: Option<String>,
        message: String,
    },
}

// =============================================================================
// Tool calls
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    /// Raw JSON argument string as sent by the upstream.
    pub arguments: String,
}

/// Terminal status of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Completed,
    Failed,
    TimedOut,
}

impl fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolCallStatus::Completed => write!(f, "completed"),
            ToolCallStatus::Failed => write!(f, "failed"),
            ToolCallStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub status: ToolCallStatus,
    pub output: String,
}

impl ToolCallResult {
    /// Whether the tool asked for its output to be shown to the client as-is.
    ///
    /// Tools signal this with a JSON object output carrying `"return_direct": true`.
    pub fn is_return_direct(&self) -> bool {
        if self.status != ToolCallStatus::Completed {
            return false;
        }
        serde_json::from_str::<serde_json::Value>(&self.output)
            .ok()
            .and_then(|v| v.get("return_direct").and_then(|b| b.as_bool()))
            .unwrap_or(false)
    }
}

// =============================================================================
// Session control
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SessionControl {
    Started { session_id: String, language: String },
    Notification { event_id: String },
    Error { code: String, message: String },
    Terminated { cause: TerminationCause },
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationCause {
    ClientClosed,
    UpstreamClosed,
    PeerError { peer: Peer, message: String },
    SetupFailed { message: String },
    RoutingInvariantViolation { message: String },
    /// A drain was requested through the registry (e.g. server shutdown).
    Shutdown,
    /// Forcefully terminated through the registry.
    Terminated,
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::ClientClosed => write!(f, "client closed the connection"),
            TerminationCause::UpstreamClosed => write!(f, "upstream closed the connection"),
            TerminationCause::PeerError { peer, message } => write!(f, "{peer} error: {message}"),
            TerminationCause::SetupFailed { message } => write!(f, "setup failed: {message}"),
            TerminationCause::RoutingInvariantViolation { message } => {
                write!(f, "routing invariant violated: {message}")
            }
            TerminationCause::Shutdown => write!(f, "server shutting down"),
            TerminationCause::Terminated => write!(f, "terminated"),
        }
    }
}

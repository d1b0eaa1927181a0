//! Client-facing JSON protocol.
//!
//! Every frame sent to the client is a JSON object with a `type` tag and the
//! `sequence` number of the event it carries. Clients may send:
//!
//! - binary frames: raw PCM16 audio
//! - non-JSON text: treated as a user text message
//! - `text`, `conversation.item.create`, `input_audio_buffer.*`, `response.*`
//! - any other JSON object with a `type`: forwarded upstream verbatim

use base64::prelude::*;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CodecError, CodecResult, timestamp_now};
use crate::core::events::{
    ClientMessage, Event, EventKind, Peer, Role, SessionControl, TerminationCause,
    ToolCallResult, ToolCallStatus, TurnControl, UpstreamMessage,
};

/// Greeting sent in `connection_established`.
pub const CONNECTION_GREETING: &str =
    "🎬 Connected to CineBot. Ask anything about movies or TV shows!";

/// Message types the bridge interprets itself when received from a client.
const INBOUND_TYPES: &[&str] = &[
    "text",
    "conversation.item.create",
    "input_audio_buffer.append",
    "input_audio_buffer.commit",
    "input_audio_buffer.clear",
    "response.create",
    "response.cancel",
];

/// A sequenced client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(flatten)]
    pub message: ClientWireMessage,
}

/// Where an `error` frame originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOrigin {
    #[default]
    Bridge,
    Upstream,
}

/// All message types of the client protocol, in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientWireMessage {
    // -------------------------------------------------------------------------
    // Client -> bridge
    // -------------------------------------------------------------------------
    #[serde(rename = "text")]
    Text {
        text: String,
        #[serde(default)]
        role: Role,
    },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: Value },

    #[serde(rename = "input_audio_buffer.append")]
    AudioAppend { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    AudioCommit,

    #[serde(rename = "input_audio_buffer.clear")]
    AudioClear,

    #[serde(rename = "response.create")]
    ResponseCreate,

    #[serde(rename = "response.cancel")]
    ResponseCancel,

    // -------------------------------------------------------------------------
    // Bridge -> client
    // -------------------------------------------------------------------------
    #[serde(rename = "connection_established")]
    ConnectionEstablished {
        session_id: String,
        message: String,
        language: String,
        timestamp: String,
    },

    #[serde(rename = "text_response")]
    TextResponse {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
        timestamp: String,
    },

    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        delta: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },

    #[serde(rename = "transcript")]
    Transcript {
        role: Role,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },

    #[serde(rename = "event.notification")]
    Notification { event_id: String },

    #[serde(rename = "tool_output")]
    ToolOutput {
        call_id: String,
        status: ToolCallStatus,
        output: String,
    },

    #[serde(rename = "error")]
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
        #[serde(default)]
        origin: ErrorOrigin,
    },

    #[serde(rename = "session_terminated")]
    SessionTerminated { cause: TerminationCause },
}

impl ClientWireMessage {
    /// Wire representation of an event destined for the client.
    pub fn from_kind(kind: &EventKind) -> CodecResult<Self> {
        let message = match kind {
            EventKind::SessionControl(control) => match control {
                SessionControl::Started {
                    session_id,
                    language,
                } => Self::ConnectionEstablished {
                    session_id: session_id.clone(),
                    message: CONNECTION_GREETING.to_string(),
                    language: language.clone(),
                    timestamp: timestamp_now(),
                },
                SessionControl::Notification { event_id } => Self::Notification {
                    event_id: event_id.clone(),
                },
                SessionControl::Error { code, message } => Self::Error {
                    code: Some(code.clone()),
                    message: message.clone(),
                    origin: ErrorOrigin::Bridge,
                },
                SessionControl::Terminated { cause } => Self::SessionTerminated {
                    cause: cause.clone(),
                },
            },
            EventKind::UpstreamMessage(message) => match message {
                UpstreamMessage::AudioDelta {
                    response_id,
                    item_id,
                    delta,
                } => Self::AudioDelta {
                    delta: delta.clone(),
                    response_id: response_id.clone(),
                    item_id: item_id.clone(),
                },
                UpstreamMessage::TextDone {
                    response_id,
                    item_id,
                    text,
                } => Self::TextResponse {
                    content: text.clone(),
                    response_id: response_id.clone(),
                    item_id: item_id.clone(),
                    timestamp: timestamp_now(),
                },
                UpstreamMessage::Transcript {
                    role,
                    text,
                    item_id,
                } => Self::Transcript {
                    role: *role,
                    text: text.clone(),
                    item_id: item_id.clone(),
                },
                UpstreamMessage::SpeechStarted {
                    audio_start_ms,
                    item_id,
                } => Self::SpeechStarted {
                    audio_start_ms: *audio_start_ms,
                    item_id: item_id.clone(),
                },
                UpstreamMessage::SpeechStopped {
                    audio_end_ms,
                    item_id,
                } => Self::SpeechStopped {
                    audio_end_ms: *audio_end_ms,
                    item_id: item_id.clone(),
                },
                UpstreamMessage::TurnComplete {
                    response_id,
                    status,
                } => Self::ResponseDone {
                    response_id: response_id.clone(),
                    status: status.clone(),
                },
                UpstreamMessage::Error { code, message } => Self::Error {
                    code: code.clone(),
                    message: message.clone(),
                    origin: ErrorOrigin::Upstream,
                },
            },
            EventKind::ToolCallResult(result) => Self::ToolOutput {
                call_id: result.call_id.clone(),
                status: result.status,
                output: result.output.clone(),
            },
            EventKind::ClientMessage(_) | EventKind::ToolCallRequest(_) => {
                return Err(CodecError::Unsupported {
                    kind: kind.label(),
                    peer: Peer::Client,
                });
            }
        };
        Ok(message)
    }

    /// Event payload carried by this wire message.
    pub fn into_kind(self) -> CodecResult<EventKind> {
        let kind = match self {
            Self::Text { text, role } => client_text(role, text)?,
            Self::ConversationItemCreate { item } => match item_text(&item) {
                Some((role, text)) => client_text(role, text)?,
                None => EventKind::ClientMessage(ClientMessage::Passthrough(serde_json::json!({
                    "type": "conversation.item.create",
                    "item": item,
                }))),
            },
            Self::AudioAppend { audio } => {
                let data = BASE64_STANDARD
                    .decode(audio.as_bytes())
                    .map_err(|e| CodecError::InvalidField {
                        field: "audio",
                        reason: e.to_string(),
                    })?;
                EventKind::ClientMessage(ClientMessage::Audio(Bytes::from(data)))
            }
            Self::AudioCommit => turn(TurnControl::CommitAudio),
            Self::AudioClear => turn(TurnControl::ClearAudio),
            Self::ResponseCreate => turn(TurnControl::CreateResponse),
            Self::ResponseCancel => turn(TurnControl::CancelResponse),
            Self::ConnectionEstablished {
                session_id,
                language,
                ..
            } => EventKind::SessionControl(SessionControl::Started {
                session_id,
                language,
            }),
            Self::TextResponse {
                content,
                response_id,
                item_id,
                ..
            } => EventKind::UpstreamMessage(UpstreamMessage::TextDone {
                response_id,
                item_id,
                text: content,
            }),
            Self::AudioDelta {
                delta,
                response_id,
                item_id,
            } => EventKind::UpstreamMessage(UpstreamMessage::AudioDelta {
                response_id,
                item_id,
                delta,
            }),
            Self::Transcript {
                role,
                text,
                item_id,
            } => EventKind::UpstreamMessage(UpstreamMessage::Transcript {
                role,
                text,
                item_id,
            }),
            Self::SpeechStarted {
                audio_start_ms,
                item_id,
            } => EventKind::UpstreamMessage(UpstreamMessage::SpeechStarted {
                audio_start_ms,
                item_id,
            }),
            Self::SpeechStopped {
                audio_end_ms,
                item_id,
            } => EventKind::UpstreamMessage(UpstreamMessage::SpeechStopped {
                audio_end_ms,
                item_id,
            }),
            Self::ResponseDone {
                response_id,
                status,
            } => EventKind::UpstreamMessage(UpstreamMessage::TurnComplete {
                response_id,
                status,
            }),
            Self::Notification { event_id } => {
                EventKind::SessionControl(SessionControl::Notification { event_id })
            }
            Self::ToolOutput {
                call_id,
                status,
                output,
            } => EventKind::ToolCallResult(ToolCallResult {
                call_id,
                status,
                output,
            }),
            Self::Error {
                code,
                message,
                origin: ErrorOrigin::Upstream,
            } => EventKind::UpstreamMessage(UpstreamMessage::Error { code, message }),
            Self::Error {
                code,
                message,
                origin: ErrorOrigin::Bridge,
            } => EventKind::SessionControl(SessionControl::Error {
                code: code.unwrap_or_else(|| "error".to_string()),
                message,
            }),
            Self::SessionTerminated { cause } => {
                EventKind::SessionControl(SessionControl::Terminated { cause })
            }
        };
        Ok(kind)
    }
}

/// Decode a text frame received from the client.
pub fn decode_client_frame(text: &str) -> CodecResult<EventKind> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return client_text(Role::User, text.to_string()),
    };

    let Value::Object(ref map) = value else {
        return client_text(Role::User, text.to_string());
    };

    let Some(message_type) = map.get("type").and_then(Value::as_str) else {
        return Err(CodecError::MissingField("type"));
    };

    // response.create carrying its own config goes upstream untouched
    let has_response_config = message_type == "response.create" && map.contains_key("response");
    if !INBOUND_TYPES.contains(&message_type) || has_response_config {
        return Ok(EventKind::ClientMessage(ClientMessage::Passthrough(value)));
    }

    let message: ClientWireMessage =
        serde_json::from_value(value).map_err(|e| CodecError::InvalidJson(e.to_string()))?;
    message.into_kind()
}

/// Decode a binary frame received from the client.
#[inline]
pub fn decode_client_binary(data: Bytes) -> EventKind {
    EventKind::ClientMessage(ClientMessage::Audio(data))
}

/// Encode an event for the client, stamping its sequence number.
pub fn encode_client_event(event: &Event) -> CodecResult<String> {
    let envelope = ClientEnvelope {
        sequence: Some(event.sequence()),
        message: ClientWireMessage::from_kind(event.kind())?,
    };
    serde_json::to_string(&envelope).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decode a sequenced frame produced by [`encode_client_event`].
pub fn decode_client_envelope(text: &str) -> CodecResult<Event> {
    let envelope: ClientEnvelope =
        serde_json::from_str(text).map_err(|e| CodecError::InvalidJson(e.to_string()))?;
    let sequence = envelope
        .sequence
        .ok_or(CodecError::MissingField("sequence"))?;
    Ok(Event::new(sequence, envelope.message.into_kind()?))
}

fn client_text(role: Role, text: String) -> CodecResult<EventKind> {
    if text.trim().is_empty() {
        return Err(CodecError::InvalidField {
            field: "text",
            reason: "empty message".to_string(),
        });
    }
    Ok(EventKind::ClientMessage(ClientMessage::Text { role, text }))
}

fn turn(control: TurnControl) -> EventKind {
    EventKind::ClientMessage(ClientMessage::TurnControl(control))
}

/// Extract `(role, text)` from a message item made of `input_text` parts.
fn item_text(item: &Value) -> Option<(Role, String)> {
    if item.get("type").and_then(Value::as_str) != Some("message") {
        return None;
    }
    let role = match item.get("role").and_then(Value::as_str) {
        None | Some("user") => Role::User,
        Some("system") => Role::System,
        Some(_) => return None,
    };
    let parts: Vec<&str> = item
        .get("content")?
        .as_array()?
        .iter()
        .filter(|part| {
            matches!(
                part.get("type").and_then(Value::as_str),
                Some("input_text") | Some("text")
            )
        })
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some((role, parts.join("\n")))
}

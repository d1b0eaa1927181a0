//! OpenAI Realtime protocol translation.
//!
//! Outbound events become one or more `ClientEvent` frames, each stamped with
//! an `event_id` derived from the event's sequence number. Inbound server
//! events become [`UpstreamFrame`]s; function call names arrive in a separate
//! `response.output_item.added` event and are surfaced as
//! [`UpstreamFrame::FunctionCallAnnounced`] for the connector to correlate.

use serde_json::Value;

use super::{CodecError, CodecResult};
use crate::core::events::{
    ClientMessage, Event, EventKind, Peer, Role, ToolCallRequest, TurnControl, UpstreamMessage,
};
use crate::core::tools::ToolDefinition;
use crate::core::upstream::openai::{
    ClientEvent, ConversationItem, DEFAULT_TRANSCRIPTION_MODEL, InputAudioTranscription,
    Modality, OutboundFrame, RealtimeVoice, ResponseConfig, ServerEvent, SessionConfig, ToolDef,
};

const TEXT_RESPONSE_INSTRUCTIONS: &str = "Please respond by text.";
const AUDIO_RESPONSE_INSTRUCTIONS: &str = "Please respond by audio.";

/// `event_id` for the `index`-th frame produced from event `sequence`.
pub fn event_id(sequence: u64, index: usize) -> String {
    if index == 0 {
        format!("evt_{sequence}")
    } else {
        format!("evt_{sequence}_{index}")
    }
}

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamFrame {
    /// Routable event.
    Event(EventKind),
    /// A function call item was opened; its arguments arrive later.
    FunctionCallAnnounced { call_id: String, name: String },
    /// Known event the bridge does not route.
    Ignored(&'static str),
}

/// Encoder for frames sent to the upstream service.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpstreamCodec {
    text_mode: bool,
    voice: RealtimeVoice,
}

impl UpstreamCodec {
    pub fn new(text_mode: bool, voice: RealtimeVoice) -> Self {
        Self { text_mode, voice }
    }

    fn modalities(&self) -> Vec<String> {
        if self.text_mode {
            vec![Modality::Text.as_str().to_string()]
        } else {
            vec![
                Modality::Text.as_str().to_string(),
                Modality::Audio.as_str().to_string(),
            ]
        }
    }

    /// Per-response configuration attached to every `response.create`.
    pub fn response_config(&self) -> ResponseConfig {
        if self.text_mode {
            ResponseConfig {
                modalities: Some(self.modalities()),
                instructions: Some(TEXT_RESPONSE_INSTRUCTIONS.to_string()),
                voice: None,
            }
        } else {
            ResponseConfig {
                modalities: Some(self.modalities()),
                instructions: Some(AUDIO_RESPONSE_INSTRUCTIONS.to_string()),
                voice: Some(self.voice.as_str().to_string()),
            }
        }
    }

    /// The initial `session.update` frame.
    pub fn session_update(&self, instructions: &str, tools: &[ToolDefinition]) -> CodecResult<String> {
        let session = SessionConfig {
            modalities: Some(self.modalities()),
            instructions: Some(instructions.to_string()),
            voice: Some(self.voice.as_str().to_string()),
            input_audio_transcription: Some(InputAudioTranscription {
                model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            }),
            tools: (!tools.is_empty()).then(|| tools.iter().map(ToolDef::from).collect()),
            tool_choice: (!tools.is_empty()).then(|| "auto".to_string()),
        };
        serialize(&OutboundFrame {
            event_id: Some("evt_session".to_string()),
            event: ClientEvent::SessionUpdate { session },
        })
    }

    /// Translate an event into the frames to send upstream, in order.
    pub fn encode(&self, event: &Event) -> CodecResult<Vec<String>> {
        let events: Vec<ClientEvent> = match event.kind() {
            EventKind::ClientMessage(message) => match message {
                ClientMessage::Text { role, text } => {
                    let item = ClientEvent::ConversationItemCreate {
                        item: ConversationItem::text_message(role.as_str(), text),
                        previous_item_id: None,
                    };
                    if *role == Role::User {
                        vec![item, self.response_create()]
                    } else {
                        vec![item]
                    }
                }
                ClientMessage::Audio(data) => vec![ClientEvent::audio_append(data)],
                ClientMessage::TurnControl(control) => vec![match control {
                    TurnControl::CommitAudio => ClientEvent::InputAudioBufferCommit,
                    TurnControl::ClearAudio => ClientEvent::InputAudioBufferClear,
                    TurnControl::CreateResponse => self.response_create(),
                    TurnControl::CancelResponse => ClientEvent::ResponseCancel,
                }],
                ClientMessage::Passthrough(value) => {
                    return Ok(vec![passthrough(value, event.sequence())?]);
                }
            },
            EventKind::ToolCallResult(result) => vec![
                ClientEvent::ConversationItemCreate {
                    item: ConversationItem::function_output(&result.call_id, &result.output),
                    previous_item_id: None,
                },
                self.response_create(),
            ],
            other => {
                return Err(CodecError::Unsupported {
                    kind: other.label(),
                    peer: Peer::Upstream,
                });
            }
        };

        events
            .into_iter()
            .enumerate()
            .map(|(index, event_kind)| {
                serialize(&OutboundFrame {
                    event_id: Some(event_id(event.sequence(), index)),
                    event: event_kind,
                })
            })
            .collect()
    }

    fn response_create(&self) -> ClientEvent {
        ClientEvent::ResponseCreate {
            response: Some(self.response_config()),
        }
    }
}

/// Decode a frame received from the upstream service.
pub fn decode_server_frame(text: &str) -> CodecResult<UpstreamFrame> {
    let event: ServerEvent =
        serde_json::from_str(text).map_err(|e| CodecError::InvalidJson(e.to_string()))?;

    let upstream = |message| Ok(UpstreamFrame::Event(EventKind::UpstreamMessage(message)));

    match event {
        ServerEvent::Error { error } => upstream(UpstreamMessage::Error {
            code: error
                .code
                .or_else(|| (!error.error_type.is_empty()).then_some(error.error_type)),
            message: error.message,
        }),
        ServerEvent::SpeechStarted {
            audio_start_ms,
            item_id,
        } => upstream(UpstreamMessage::SpeechStarted {
            audio_start_ms,
            item_id,
        }),
        ServerEvent::SpeechStopped {
            audio_end_ms,
            item_id,
        } => upstream(UpstreamMessage::SpeechStopped {
            audio_end_ms,
            item_id,
        }),
        ServerEvent::TranscriptionCompleted {
            item_id,
            transcript,
        } => upstream(UpstreamMessage::Transcript {
            role: Role::User,
            text: transcript,
            item_id,
        }),
        ServerEvent::TranscriptionFailed { error, .. } => upstream(UpstreamMessage::Error {
            code: Some("transcription_failed".to_string()),
            message: error.message,
        }),
        ServerEvent::ResponseDone { response } => {
            let (response_id, status) = response
                .map(|r| (r.id, r.status))
                .unwrap_or((None, None));
            upstream(UpstreamMessage::TurnComplete {
                response_id,
                status,
            })
        }
        ServerEvent::OutputItemAdded { item, .. } => match (item.item_type.as_str(), item.call_id, item.name) {
            ("function_call", Some(call_id), Some(name)) => {
                Ok(UpstreamFrame::FunctionCallAnnounced { call_id, name })
            }
            _ => Ok(UpstreamFrame::Ignored("response.output_item.added")),
        },
        ServerEvent::TextDone {
            response_id,
            item_id,
            text,
        } => upstream(UpstreamMessage::TextDone {
            response_id,
            item_id,
            text,
        }),
        ServerEvent::AudioTranscriptDone {
            item_id,
            transcript,
        } => upstream(UpstreamMessage::Transcript {
            role: Role::Assistant,
            text: transcript,
            item_id,
        }),
        ServerEvent::AudioDelta {
            response_id,
            item_id,
            delta,
        } => upstream(UpstreamMessage::AudioDelta {
            response_id,
            item_id,
            delta,
        }),
        ServerEvent::FunctionCallArgumentsDone {
            call_id,
            name,
            arguments,
            ..
        } => Ok(UpstreamFrame::Event(EventKind::ToolCallRequest(
            ToolCallRequest {
                call_id,
                name: name.unwrap_or_default(),
                arguments,
            },
        ))),
        ServerEvent::SessionCreated { .. } => Ok(UpstreamFrame::Ignored("session.created")),
        ServerEvent::SessionUpdated { .. } => Ok(UpstreamFrame::Ignored("session.updated")),
        ServerEvent::InputAudioBufferCommitted {} => {
            Ok(UpstreamFrame::Ignored("input_audio_buffer.committed"))
        }
        ServerEvent::InputAudioBufferCleared {} => {
            Ok(UpstreamFrame::Ignored("input_audio_buffer.cleared"))
        }
        ServerEvent::ConversationItemCreated {} => {
            Ok(UpstreamFrame::Ignored("conversation.item.created"))
        }
        ServerEvent::ResponseCreated {} => Ok(UpstreamFrame::Ignored("response.created")),
        ServerEvent::OutputItemDone {} => Ok(UpstreamFrame::Ignored("response.output_item.done")),
        ServerEvent::ContentPartAdded {} => {
            Ok(UpstreamFrame::Ignored("response.content_part.added"))
        }
        ServerEvent::ContentPartDone {} => Ok(UpstreamFrame::Ignored("response.content_part.done")),
        ServerEvent::TextDelta {} => Ok(UpstreamFrame::Ignored("response.text.delta")),
        ServerEvent::AudioTranscriptDelta {} => {
            Ok(UpstreamFrame::Ignored("response.audio_transcript.delta"))
        }
        ServerEvent::AudioDone {} => Ok(UpstreamFrame::Ignored("response.audio.done")),
        ServerEvent::FunctionCallArgumentsDelta {} => Ok(UpstreamFrame::Ignored(
            "response.function_call_arguments.delta",
        )),
        ServerEvent::RateLimitsUpdated {} => Ok(UpstreamFrame::Ignored("rate_limits.updated")),
        ServerEvent::Unknown => Ok(UpstreamFrame::Ignored("unknown")),
    }
}

fn passthrough(value: &Value, sequence: u64) -> CodecResult<String> {
    let mut value = value.clone();
    if let Value::Object(ref mut map) = value {
        map.entry("event_id")
            .or_insert_with(|| Value::String(event_id(sequence, 0)));
    }
    serde_json::to_string(&value).map_err(|e| CodecError::Serialization(e.to_string()))
}

fn serialize(frame: &OutboundFrame) -> CodecResult<String> {
    serde_json::to_string(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

//! OpenAI Realtime upstream.
//!
//! # Audio Format
//!
//! Input and output audio is PCM 16-bit signed little-endian at 24kHz,
//! base64 encoded inside JSON frames.

pub mod client;
pub mod config;
pub mod messages;

pub use client::OpenAIConnector;
pub use config::{
    DEFAULT_INSTRUCTIONS, DEFAULT_REALTIME_MODEL, DEFAULT_TRANSCRIPTION_MODEL, Modality,
    OPENAI_REALTIME_URL, RealtimeVoice, UpstreamSettings,
};
pub use messages::{
    ApiError, ClientEvent, ContentPart, ConversationItem, InputAudioTranscription, OutboundFrame,
    ResponseConfig, ServerEvent, SessionConfig, ToolDef,
};

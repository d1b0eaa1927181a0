//! OpenAI Realtime API configuration types.
//!
//! This module contains configuration types for the upstream connection:
//! - Endpoint and model selection
//! - Voice selection
//! - Response modalities
//! - The per-session settings handed to the connector

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::tools::ToolDefinition;

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Model used when none is configured.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-mini-realtime-preview";

/// Input transcription model requested in `session.update`.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Instructions used when none are configured.
pub const DEFAULT_INSTRUCTIONS: &str = "You are CineBot, a friendly assistant for movies and TV shows. \
Use the TMDB tools to look up titles, people, credits and trends instead of guessing. \
Keep answers short and conversational.";

// =============================================================================
// Voices
// =============================================================================

/// Available voices for OpenAI Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeVoice {
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    /// Sage voice (default)
    #[default]
    Sage,
    Shimmer,
    Verse,
}

impl RealtimeVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "alloy" => Self::Alloy,
            "ash" => Self::Ash,
            "ballad" => Self::Ballad,
            "coral" => Self::Coral,
            "echo" => Self::Echo,
            "sage" => Self::Sage,
            "shimmer" => Self::Shimmer,
            "verse" => Self::Verse,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for RealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Modalities
// =============================================================================

/// Output modalities for OpenAI Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Text output only
    Text,
    /// Audio output only
    Audio,
}

impl Modality {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
        }
    }
}

// =============================================================================
// Connector settings
// =============================================================================

/// Everything the upstream connector needs for one session.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Base WebSocket URL without query string
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub voice: RealtimeVoice,
    /// Respond with text only instead of text and audio
    pub text_mode: bool,
    /// Session instructions sent in the first `session.update`
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
    /// Capacity of the outbound and inbound queues
    pub queue_capacity: usize,
    /// Upper bound on a graceful close before the I/O task is aborted
    pub close_timeout: Duration,
}

impl UpstreamSettings {
    /// Build the WebSocket URL with model parameter.
    pub fn ws_url(&self) -> String {
        format!("{}?model={}", self.url.trim_end_matches('/'), self.model)
    }

    /// Host header value derived from the URL.
    pub fn host(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.url).ok()?;
        let host = parsed.host_str()?.to_string();
        Some(match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        })
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: OPENAI_REALTIME_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            voice: RealtimeVoice::default(),
            text_mode: false,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            tools: Vec::new(),
            queue_capacity: 256,
            close_timeout: Duration::from_secs(2),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Upstream realtime model connectors.

pub mod openai;

pub use openai::{OpenAIConnector, RealtimeVoice, UpstreamSettings};

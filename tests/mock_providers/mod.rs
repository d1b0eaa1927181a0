//! Mock upstream servers
//!
//! - `openai_realtime_mock`: scripted OpenAI Realtime WebSocket server

// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

pub mod openai_realtime_mock;

pub use openai_realtime_mock::MockRealtimeServer;

//! Wire codecs for both session peers.
//!
//! Pure, stateless translation between JSON frames and [`EventKind`]s:
//! - [`client`]: the JSON protocol spoken with browser/CLI clients
//! - [`upstream`]: the OpenAI Realtime protocol
//!
//! [`EventKind`]: crate::core::events::EventKind

pub mod client;
pub mod upstream;

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::events::Peer;

pub use client::{
    CONNECTION_GREETING, ClientEnvelope, ClientWireMessage, ErrorOrigin, decode_client_binary,
    decode_client_envelope, decode_client_frame, encode_client_event,
};
pub use upstream::{UpstreamCodec, UpstreamFrame, decode_server_frame, event_id};

/// Errors raised while translating frames.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Cannot encode {kind} for the {peer}")]
    Unsupported { kind: &'static str, peer: Peer },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Current UTC time as RFC 3339, used for client-facing timestamps.
pub(crate) fn timestamp_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

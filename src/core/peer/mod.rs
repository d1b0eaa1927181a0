//! Peer connectors.
//!
//! A [`Connector`] owns one remote connection (the client WebSocket or the
//! upstream realtime service) and exposes it to the session coordinator as a
//! bounded outbound queue plus a finite inbound [`EventStream`].
//!
//! - [`link`]: queues, lifecycle state and task bookkeeping shared by all connectors
//! - [`stream`]: the inbound event stream
//! - [`channel`]: in-memory connector used for tests and benchmarks

pub mod channel;
pub mod link;
pub mod stream;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::events::{Event, EventKind, Peer};

pub use channel::{ChannelConnector, ChannelRemote};
pub use link::{InboundSink, PeerLink};
pub use stream::EventStream;

// =============================================================================
// Error Types
// =============================================================================

/// Errors reported by connectors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConnectorError {
    /// The outbound queue is full; the event is handed back to the caller.
    #[error("{peer} outbound queue is full")]
    Backpressure { peer: Peer, event: Box<Event> },

    /// The connection could not be established.
    #[error("Connection to {peer} failed: {reason}")]
    ConnectionFailed { peer: Peer, reason: String },

    /// The connector is not open for sending.
    #[error("{peer} connector is not open")]
    NotOpen { peer: Peer },

    /// A single inbound frame could not be decoded. The connection survives.
    #[error("Malformed frame from {peer}: {reason}")]
    MalformedFrame { peer: Peer, reason: String },

    /// The transport failed. The connection is gone.
    #[error("{peer} transport error: {reason}")]
    Transport { peer: Peer, reason: String },

    /// The connection has been closed.
    #[error("{peer} connection closed")]
    Closed { peer: Peer },
}

impl ConnectorError {
    /// Whether the error ends the connection.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Transport { .. } | Self::Closed { .. }
        )
    }

    pub fn peer(&self) -> Peer {
        match self {
            Self::Backpressure { peer, .. }
            | Self::ConnectionFailed { peer, .. }
            | Self::NotOpen { peer }
            | Self::MalformedFrame { peer, .. }
            | Self::Transport { peer, .. }
            | Self::Closed { peer } => *peer,
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Open,
    Closing,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

// =============================================================================
// Inbound items
// =============================================================================

/// One item of an inbound [`EventStream`].
///
/// The stream ends after the first `Closed` or `Errored` item.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Event(EventKind),
    /// A recoverable problem, e.g. an undecodable frame.
    Transient(ConnectorError),
    /// The remote closed the connection cleanly.
    Closed { reason: Option<String> },
    /// The connection failed.
    Errored(ConnectorError),
}

impl Received {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Received::Closed { .. } | Received::Errored(_))
    }
}

// =============================================================================
// Connector trait
// =============================================================================

/// A connection to one session peer.
///
/// All methods take `&self`; implementations synchronize internally so the
/// coordinator can send and close while the inbound stream is being read.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Which side of the session this connector talks to.
    fn peer(&self) -> Peer;

    fn state(&self) -> ConnectionState;

    /// Establish the connection. Must be called once before sending.
    async fn open(&self) -> ConnectorResult<()>;

    /// Queue an event without waiting.
    ///
    /// Returns [`ConnectorError::Backpressure`] carrying the event back when
    /// the outbound queue is full.
    fn send(&self, event: Event) -> ConnectorResult<()>;

    /// Queue an event, waiting for capacity if necessary.
    async fn send_when_ready(&self, event: Event) -> ConnectorResult<()>;

    /// Take the inbound stream. Returns `None` after the first call.
    fn receive(&self) -> Option<EventStream>;

    /// Flush queued events and close the connection. Idempotent.
    async fn close(&self) -> ConnectorResult<()>;
}

/// Boxed connector used by the session coordinator.
pub type BoxedConnector = Box<dyn Connector>;

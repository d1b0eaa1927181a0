//! Bridge error taxonomy.

use thiserror::Error;

use crate::core::events::Peer;
use crate::core::peer::ConnectorError;

/// Errors raised while running a session.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    /// A peer could not be opened within the setup window.
    #[error("Session setup failed: {0}")]
    SetupFailed(String),

    /// An outbound queue stayed full.
    #[error("{peer} queue is full")]
    Backpressure { peer: Peer },

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// A tool could not produce a result.
    #[error("tool '{name}' failed: {message}")]
    ToolFailure { name: String, message: String },

    #[error("tool '{name}' timed out after {timeout_ms}ms")]
    ToolTimeout { name: String, timeout_ms: u64 },

    /// The session broke one of its routing guarantees.
    #[error("Routing invariant violated: {0}")]
    RoutingInvariantViolation(String),

    #[error("Session {0} is already registered")]
    DuplicateSession(String),
}

impl BridgeError {
    /// Whether the error ends the session.
    pub fn is_terminal(&self) -> bool {
        match self {
            BridgeError::Connector(e) => e.is_terminal(),
            BridgeError::Backpressure { .. }
            | BridgeError::ToolFailure { .. }
            | BridgeError::ToolTimeout { .. } => false,
            BridgeError::SetupFailed(_)
            | BridgeError::RoutingInvariantViolation(_)
            | BridgeError::DuplicateSession(_) => true,
        }
    }

    pub fn is_backpressure(&self) -> bool {
        matches!(
            self,
            BridgeError::Backpressure { .. }
                | BridgeError::Connector(ConnectorError::Backpressure { .. })
        )
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

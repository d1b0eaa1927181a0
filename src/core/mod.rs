pub mod codec;
pub mod error;
pub mod events;
pub mod peer;
pub mod session;
pub mod tools;
pub mod upstream;

// Re-export commonly used types for convenience
pub use error::{BridgeError, BridgeResult};

pub use events::{
    ClientMessage, Event, EventKind, Peer, Role, SessionControl, TerminationCause,
    ToolCallRequest, ToolCallResult, ToolCallStatus, TurnControl, UpstreamMessage,
};

pub use peer::{
    BoxedConnector, ChannelConnector, ChannelRemote, ConnectionState, Connector, ConnectorError,
    ConnectorResult, EventStream, Received,
};

pub use session::{
    CoordinatorSettings, LifecycleEvent, SessionCoordinator, SessionHandle, SessionRegistry,
    SessionState, SessionSummary,
};

pub use tools::{Tool, ToolDefinition, ToolDispatcher, ToolError, ToolResult};

pub use upstream::{OpenAIConnector, RealtimeVoice, UpstreamSettings};

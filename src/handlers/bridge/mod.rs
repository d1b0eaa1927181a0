//! Client WebSocket endpoint bridging to the OpenAI Realtime API.
//!
//! - `gateway`: client connector over the accepted WebSocket
//! - `handler`: `GET /ws` upgrade and session startup

pub mod gateway;
pub mod handler;

pub use gateway::ClientGateway;
pub use handler::{BridgeQuery, bridge_handler};

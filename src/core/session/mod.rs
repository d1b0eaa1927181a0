//! Session lifecycle: state machine, registry and coordinator.

pub mod coordinator;
pub mod registry;
pub mod state;

pub use coordinator::{
    CoordinatorSettings, DEFAULT_DRAIN_TIMEOUT, DEFAULT_SETUP_TIMEOUT, RUN_TOOL_EVENT_ID,
    SessionCoordinator, SessionSummary, WaitHint,
};
pub use registry::{LifecycleEvent, RegistrationGuard, SessionHandle, SessionRegistry};
pub use state::SessionState;

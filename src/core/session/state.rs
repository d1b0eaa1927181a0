//! Session lifecycle states.

use std::fmt;

use serde::Serialize;

/// `Initializing → Active → Draining → Terminated`.
///
/// `Initializing` may also move straight to `Terminated` when setup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Initializing,
    Active,
    Draining,
    Terminated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Active => "active",
            SessionState::Draining => "draining",
            SessionState::Terminated => "terminated",
        }
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Initializing, Active)
                | (Initializing, Terminated)
                | (Active, Draining)
                | (Active, Terminated)
                | (Draining, Terminated)
        )
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        *self == SessionState::Terminated
    }

    /// Whether events are still routed in this state.
    #[inline]
    pub fn is_routing(&self) -> bool {
        *self == SessionState::Active
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use SessionState::*;
        assert!(Initializing.can_transition_to(Active));
        assert!(Initializing.can_transition_to(Terminated));
        assert!(Active.can_transition_to(Draining));
        assert!(Draining.can_transition_to(Terminated));

        assert!(!Initializing.can_transition_to(Draining));
        assert!(!Draining.can_transition_to(Active));
        assert!(!Terminated.can_transition_to(Terminated));
        assert!(!Terminated.can_transition_to(Active));
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::Draining.to_string(), "draining");
        assert!(SessionState::Terminated.is_terminal());
        assert!(SessionState::Active.is_routing());
        assert!(!SessionState::Draining.is_routing());
    }
}

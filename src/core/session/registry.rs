//! Process-wide table of live sessions.
//!
//! The registry never owns a session: it maps ids to `Weak<SessionHandle>`,
//! and the coordinator running the session holds the only strong reference.
//! Drains and forced terminations are requested through cancellation tokens
//! on the handle; the coordinator decides how to act on them.

use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Notify, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::state::SessionState;
use crate::core::error::{BridgeError, BridgeResult};
use crate::core::events::TerminationCause;

/// Capacity of the lifecycle broadcast channel. Slow subscribers lag.
const LIFECYCLE_CHANNEL_CAPACITY: usize = 256;

/// Shared view of one session.
#[derive(Debug)]
pub struct SessionHandle {
    id: String,
    created_at: SystemTime,
    language: String,
    state: watch::Sender<SessionState>,
    drain: CancellationToken,
    force: CancellationToken,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>, language: impl Into<String>) -> Self {
        let (state, _) = watch::channel(SessionState::Initializing);
        Self {
            id: id.into(),
            created_at: SystemTime::now(),
            language: language.into(),
            state,
            drain: CancellationToken::new(),
            force: CancellationToken::new(),
        }
    }

    /// Handle with a fresh UUID v4 id.
    pub fn generate(language: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), language)
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Only the coordinator calls this. Illegal transitions are ignored.
    pub(crate) fn set_state(&self, next: SessionState) -> bool {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Ask the session to drain gracefully.
    pub fn request_drain(&self) {
        self.drain.cancel();
    }

    /// Ask the session to terminate now.
    pub fn request_terminate(&self) {
        self.force.cancel();
    }

    pub fn drain_token(&self) -> CancellationToken {
        self.drain.clone()
    }

    pub fn force_token(&self) -> CancellationToken {
        self.force.clone()
    }
}

/// Lifecycle notification published by the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Created {
        session_id: String,
        language: String,
    },
    Terminated {
        session_id: String,
        cause: TerminationCause,
    },
}

/// Thread-safe `session id → Weak<SessionHandle>` table.
pub struct SessionRegistry {
    sessions: DashMap<String, Weak<SessionHandle>>,
    events: broadcast::Sender<LifecycleEvent>,
    /// Signalled on every unregister
    unregistered: Notify,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        Self {
            sessions: DashMap::new(),
            events,
            unregistered: Notify::new(),
        }
    }

    /// Register a session. The returned guard unregisters it on drop.
    ///
    /// Fails if a live session already uses the same id; a stale entry whose
    /// session is gone is replaced.
    pub fn register(
        self: &Arc<Self>,
        handle: &Arc<SessionHandle>,
    ) -> BridgeResult<RegistrationGuard> {
        match self.sessions.entry(handle.id().to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().upgrade().is_some() {
                    return Err(BridgeError::DuplicateSession(handle.id().to_string()));
                }
                entry.insert(Arc::downgrade(handle));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::downgrade(handle));
            }
        }

        debug!(session_id = %handle.id(), "Session registered");
        self.publish(LifecycleEvent::Created {
            session_id: handle.id().to_string(),
            language: handle.language().to_string(),
        });

        Ok(RegistrationGuard {
            registry: Arc::clone(self),
            session_id: handle.id().to_string(),
        })
    }

    /// Remove a session. Returns whether an entry was removed.
    pub fn unregister(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            debug!(session_id, "Session unregistered");
            self.unregistered.notify_waiters();
        }
        removed
    }

    pub fn lookup(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(session_id)?.upgrade()
    }

    /// Run `f` on every live session.
    ///
    /// Handles are collected first so `f` never runs under a map lock.
    pub fn for_each_active<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<SessionHandle>),
    {
        let handles: Vec<Arc<SessionHandle>> = self
            .sessions
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect();
        for handle in &handles {
            f(handle);
        }
    }

    /// Request a graceful drain of every live session. Returns how many were asked.
    pub fn drain_all(&self) -> usize {
        let mut count = 0;
        self.for_each_active(|handle| {
            handle.request_drain();
            count += 1;
        });
        info!(sessions = count, "Draining all sessions");
        count
    }

    /// Force-terminate a session.
    ///
    /// Returns `false` when the session is unknown or already terminated or
    /// terminating, making repeated calls a no-op.
    pub fn terminate(&self, session_id: &str) -> bool {
        let Some(handle) = self.lookup(session_id) else {
            return false;
        };
        if handle.state().is_terminal() || handle.force.is_cancelled() {
            return false;
        }
        handle.request_terminate();
        true
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    /// Subscribe to lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Publish a lifecycle notification. Never blocks.
    pub(crate) fn publish(&self, event: LifecycleEvent) {
        let _ = self.events.send(event);
    }

    /// Wait until no sessions are registered, up to `timeout`.
    ///
    /// Returns whether the registry emptied in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                // Enabled before the count is read so an unregister in
                // between still wakes us.
                let notified = self.unregistered.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }
}

/// Unregisters its session on drop.
pub struct RegistrationGuard {
    registry: Arc<SessionRegistry>,
    session_id: String,
}

impl RegistrationGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.session_id);
    }
}

//! Session coordinator.
//!
//! One coordinator task runs one session. It is the only writer of session
//! state and the only component that assigns sequence numbers, so the order
//! in which it accepts events is the order in which each peer receives them.
//!
//! ```text
//!  client ──► coordinator ──► upstream
//!    ▲            │  ▲           │
//!    │            ▼  │           │
//!    └──────── tool tasks ◄──────┘ (ToolCallRequest)
//! ```
//!
//! Tool calls run on their own tasks so neither stream ever waits for a tool.
//! Their results come back through a `JoinSet` and are injected into the
//! upstream queue in completion order.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::future::try_join;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::registry::{LifecycleEvent, SessionHandle, SessionRegistry};
use super::state::SessionState;
use crate::core::error::BridgeError;
use crate::core::events::{
    Event, EventKind, Peer, SessionControl, TerminationCause, ToolCallRequest, ToolCallResult,
    UpstreamMessage,
};
use crate::core::peer::{BoxedConnector, ConnectionState, ConnectorError, Received};
use crate::core::tools::{ToolDispatcher, ToolInvocation};

/// Default time allowed for both peers to open.
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for in-flight tool calls once draining starts.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest wait for client queue space when sending `session_terminated`.
pub const TERMINATION_NOTICE_TIMEOUT: Duration = Duration::from_millis(500);

/// `event_id` of the notification sent when a tool starts running.
pub const RUN_TOOL_EVENT_ID: &str = "run_tool";

/// Audio played to the client while a slow tool runs.
#[derive(Debug, Clone)]
pub struct WaitHint {
    /// Base64 encoded audio, sent as a `response.audio.delta`
    pub audio: Arc<str>,
    /// How long a tool must run before the hint is sent
    pub delay: Duration,
}

/// Per-session timing and notification settings.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub setup_timeout: Duration,
    pub drain_timeout: Duration,
    /// Send `event.notification` with `run_tool` when a tool starts
    pub notify_tool_activity: bool,
    pub wait_hint: Option<WaitHint>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            notify_tool_activity: true,
            wait_hint: None,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub cause: TerminationCause,
    /// Every state the session went through, in order
    pub transitions: Vec<SessionState>,
}

impl SessionSummary {
    pub fn reached(&self, state: SessionState) -> bool {
        self.transitions.contains(&state)
    }
}

/// Owns one session: both connectors, its tool tasks and its state.
pub struct SessionCoordinator {
    handle: Arc<SessionHandle>,
    registry: Arc<SessionRegistry>,
    client: BoxedConnector,
    upstream: BoxedConnector,
    dispatcher: Arc<ToolDispatcher>,
    settings: CoordinatorSettings,
    state: SessionState,
    transitions: Vec<SessionState>,
    next_sequence: u64,
    call_ids: HashSet<String>,
    tools: JoinSet<ToolCallResult>,
    hint_tx: mpsc::Sender<String>,
    hint_rx: mpsc::Receiver<String>,
    cause: Option<TerminationCause>,
    drain_deadline: Option<Instant>,
}

impl SessionCoordinator {
    pub fn new(
        handle: Arc<SessionHandle>,
        registry: Arc<SessionRegistry>,
        client: BoxedConnector,
        upstream: BoxedConnector,
        dispatcher: Arc<ToolDispatcher>,
        settings: CoordinatorSettings,
    ) -> Self {
        let (hint_tx, hint_rx) = mpsc::channel(16);
        Self {
            handle,
            registry,
            client,
            upstream,
            dispatcher,
            settings,
            state: SessionState::Initializing,
            transitions: vec![SessionState::Initializing],
            next_sequence: 0,
            call_ids: HashSet::new(),
            tools: JoinSet::new(),
            hint_tx,
            hint_rx,
            cause: None,
            drain_deadline: None,
        }
    }

    pub fn session_id(&self) -> &str {
        self.handle.id()
    }

    /// Run the session to completion.
    pub async fn run(mut self) -> SessionSummary {
        let session_id = self.handle.id().to_string();

        let guard = match self.registry.register(&self.handle) {
            Ok(guard) => guard,
            Err(e) => {
                error!(session_id = %session_id, "Failed to register session: {}", e);
                let cause = TerminationCause::SetupFailed {
                    message: e.to_string(),
                };
                return self.terminate(cause).await;
            }
        };

        info!(session_id = %session_id, language = %self.handle.language(), "Session initializing");

        if let Err(e) = self.setup().await {
            warn!(session_id = %session_id, "Session setup failed: {}", e);
            let summary = self
                .terminate(TerminationCause::SetupFailed {
                    message: e.to_string(),
                })
                .await;
            drop(guard);
            return summary;
        }

        let (Some(client_events), Some(upstream_events)) =
            (self.client.receive(), self.upstream.receive())
        else {
            let summary = self
                .terminate(TerminationCause::SetupFailed {
                    message: "connector stream already taken".to_string(),
                })
                .await;
            drop(guard);
            return summary;
        };

        self.transition(SessionState::Active);
        info!(session_id = %session_id, "Session active");

        let started = EventKind::SessionControl(SessionControl::Started {
            session_id: session_id.clone(),
            language: self.handle.language().to_string(),
        });
        self.deliver(Peer::Client, started).await;

        self.route(client_events, upstream_events).await;

        let cause = self.cause.take().unwrap_or(TerminationCause::Terminated);
        let summary = self.terminate(cause).await;
        drop(guard);
        summary
    }

    /// Open both peers concurrently under the setup timeout.
    async fn setup(&mut self) -> Result<(), BridgeError> {
        let force = self.handle.force_token();
        let opens = try_join(self.client.open(), self.upstream.open());

        tokio::select! {
            _ = force.cancelled() => Err(BridgeError::SetupFailed("terminated during setup".to_string())),
            result = tokio::time::timeout(self.settings.setup_timeout, opens) => match result {
                Ok(Ok(((), ()))) => Ok(()),
                Ok(Err(e)) => Err(BridgeError::SetupFailed(e.to_string())),
                Err(_) => Err(BridgeError::SetupFailed(format!(
                    "peers did not open within {}ms",
                    self.settings.setup_timeout.as_millis()
                ))),
            },
        }
    }

    /// The routing loop. Returns once the session should terminate.
    async fn route(
        &mut self,
        mut client_events: crate::core::peer::EventStream,
        mut upstream_events: crate::core::peer::EventStream,
    ) {
        let force = self.handle.force_token();
        let drain = self.handle.drain_token();

        loop {
            if self.state == SessionState::Draining && self.tools.is_empty() {
                debug!(session_id = %self.handle.id(), "Drain complete");
                break;
            }

            let draining = self.drain_deadline.is_some();
            let deadline = self.drain_deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                biased;

                _ = force.cancelled() => {
                    info!(session_id = %self.handle.id(), "Session terminated through the registry");
                    self.cause.get_or_insert(TerminationCause::Terminated);
                    break;
                }

                _ = drain.cancelled(), if self.state == SessionState::Active => {
                    self.begin_drain(TerminationCause::Shutdown);
                }

                _ = tokio::time::sleep_until(deadline), if draining => {
                    warn!(
                        session_id = %self.handle.id(),
                        in_flight = self.tools.len(),
                        "Drain timeout elapsed, cancelling remaining tool calls"
                    );
                    break;
                }

                Some(joined) = self.tools.join_next(), if !self.tools.is_empty() => {
                    match joined {
                        Ok(result) => self.on_tool_result(result).await,
                        Err(e) => warn!(session_id = %self.handle.id(), "Tool task ended abnormally: {}", e),
                    }
                }

                Some(call_id) = self.hint_rx.recv() => {
                    self.on_wait_hint(call_id).await;
                }

                item = client_events.next(), if !client_events.is_finished() => {
                    self.on_client(item).await;
                }

                item = upstream_events.next(), if !upstream_events.is_finished() => {
                    self.on_upstream(item).await;
                }

                else => break,
            }
        }
    }

    // =========================================================================
    // Inbound handling
    // =========================================================================

    async fn on_client(&mut self, item: Option<Received>) {
        match item {
            Some(Received::Event(kind)) => {
                if self.state.is_routing() {
                    self.deliver(Peer::Upstream, kind).await;
                } else {
                    debug!(session_id = %self.handle.id(), kind = kind.label(), "Dropping client event while draining");
                }
            }
            Some(Received::Transient(err)) => {
                warn!(session_id = %self.handle.id(), "Client frame rejected: {}", err);
                if self.state.is_routing() {
                    let reason = match err {
                        ConnectorError::MalformedFrame { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    let control = EventKind::SessionControl(SessionControl::Error {
                        code: "parse_error".to_string(),
                        message: reason,
                    });
                    self.deliver(Peer::Client, control).await;
                }
            }
            Some(Received::Closed { reason }) => {
                info!(session_id = %self.handle.id(), reason = ?reason, "Client closed the connection");
                self.begin_drain(TerminationCause::ClientClosed);
            }
            None => {
                self.begin_drain(TerminationCause::ClientClosed);
            }
            Some(Received::Errored(err)) => {
                warn!(session_id = %self.handle.id(), "Client connection failed: {}", err);
                self.begin_drain(TerminationCause::PeerError {
                    peer: Peer::Client,
                    message: err.to_string(),
                });
            }
        }
    }

    async fn on_upstream(&mut self, item: Option<Received>) {
        match item {
            Some(Received::Event(EventKind::ToolCallRequest(request))) => {
                self.on_tool_request(request).await;
            }
            Some(Received::Event(kind)) => {
                if self.state.is_routing() {
                    self.deliver(Peer::Client, kind).await;
                } else {
                    debug!(session_id = %self.handle.id(), kind = kind.label(), "Dropping upstream event while draining");
                }
            }
            Some(Received::Transient(err)) => {
                warn!(session_id = %self.handle.id(), "Upstream frame rejected: {}", err);
            }
            Some(Received::Closed { reason }) => {
                info!(session_id = %self.handle.id(), reason = ?reason, "Upstream closed the connection");
                self.begin_drain(TerminationCause::UpstreamClosed);
            }
            None => {
                self.begin_drain(TerminationCause::UpstreamClosed);
            }
            Some(Received::Errored(err)) => {
                error!(session_id = %self.handle.id(), "Upstream connection failed: {}", err);
                self.begin_drain(TerminationCause::PeerError {
                    peer: Peer::Upstream,
                    message: err.to_string(),
                });
            }
        }
    }

    // =========================================================================
    // Tool calls
    // =========================================================================

    async fn on_tool_request(&mut self, request: ToolCallRequest) {
        if !self.state.is_routing() {
            warn!(
                session_id = %self.handle.id(),
                call_id = %request.call_id,
                tool = %request.name,
                "Rejecting tool call while draining"
            );
            return;
        }

        if !self.call_ids.insert(request.call_id.clone()) {
            let err = BridgeError::RoutingInvariantViolation(format!(
                "duplicate tool call id '{}'",
                request.call_id
            ));
            error!(session_id = %self.handle.id(), "{}", err);
            self.begin_drain(TerminationCause::RoutingInvariantViolation {
                message: err.to_string(),
            });
            return;
        }

        info!(
            session_id = %self.handle.id(),
            call_id = %request.call_id,
            tool = %request.name,
            in_flight = self.tools.len() + 1,
            "Dispatching tool call"
        );

        if self.settings.notify_tool_activity {
            let notification = EventKind::SessionControl(SessionControl::Notification {
                event_id: RUN_TOOL_EVENT_ID.to_string(),
            });
            self.deliver(Peer::Client, notification).await;
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let hint = self
            .settings
            .wait_hint
            .as_ref()
            .map(|h| (h.delay, self.hint_tx.clone()));
        let invocation = ToolInvocation::from(request);

        self.tools.spawn(async move {
            let call_id = invocation.call_id.clone();
            let run = dispatcher.dispatch(invocation);
            tokio::pin!(run);

            if let Some((delay, hint_tx)) = hint {
                tokio::select! {
                    result = &mut run => return result,
                    _ = tokio::time::sleep(delay) => {
                        let _ = hint_tx.try_send(call_id);
                    }
                }
            }
            run.await
        });
    }

    async fn on_tool_result(&mut self, result: ToolCallResult) {
        if !self.state.is_routing() {
            debug!(
                session_id = %self.handle.id(),
                call_id = %result.call_id,
                "Discarding tool result while draining"
            );
            return;
        }

        debug!(
            session_id = %self.handle.id(),
            call_id = %result.call_id,
            status = %result.status,
            "Tool result ready"
        );

        if result.is_return_direct() {
            self.deliver(Peer::Client, EventKind::ToolCallResult(result.clone()))
                .await;
        }
        self.deliver(Peer::Upstream, EventKind::ToolCallResult(result))
            .await;
    }

    async fn on_wait_hint(&mut self, call_id: String) {
        let Some(hint) = self.settings.wait_hint.clone() else {
            return;
        };
        if !self.state.is_routing() {
            return;
        }
        debug!(session_id = %self.handle.id(), call_id = %call_id, "Tool is slow, sending wait hint");
        let audio = EventKind::UpstreamMessage(UpstreamMessage::AudioDelta {
            response_id: None,
            item_id: None,
            delta: hint.audio.to_string(),
        });
        self.deliver(Peer::Client, audio).await;
    }

    // =========================================================================
    // Delivery and state
    // =========================================================================

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Stamp `kind` with the next sequence number and queue it for `peer`.
    ///
    /// A full queue is waited out; any other failure starts draining.
    async fn deliver(&mut self, peer: Peer, kind: EventKind) {
        let event = Event::new(self.next_sequence(), kind);
        let connector = match peer {
            Peer::Client => &self.client,
            Peer::Upstream => &self.upstream,
        };

        let result = match connector.send(event) {
            Ok(()) => Ok(()),
            Err(ConnectorError::Backpressure { event, .. }) => {
                warn!(
                    session_id = %self.handle.id(),
                    peer = %peer,
                    sequence = event.sequence(),
                    "Outbound queue full, waiting for capacity"
                );
                let force = self.handle.force_token();
                tokio::select! {
                    result = connector.send_when_ready(*event) => result,
                    _ = force.cancelled() => Ok(()),
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            debug!(session_id = %self.handle.id(), peer = %peer, "Delivery failed: {}", e);
            let cause = match e {
                ConnectorError::NotOpen { .. } | ConnectorError::Closed { .. } => match peer {
                    Peer::Client => TerminationCause::ClientClosed,
                    Peer::Upstream => TerminationCause::UpstreamClosed,
                },
                other => TerminationCause::PeerError {
                    peer,
                    message: other.to_string(),
                },
            };
            self.begin_drain(cause);
        }
    }

    fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        debug!(session_id = %self.handle.id(), from = %self.state, to = %next, "Session state change");
        self.state = next;
        self.transitions.push(next);
        self.handle.set_state(next);
        true
    }

    /// Stop accepting work and give in-flight tool calls the drain window.
    fn begin_drain(&mut self, cause: TerminationCause) {
        if !self.transition(SessionState::Draining) {
            return;
        }
        info!(
            session_id = %self.handle.id(),
            cause = %cause,
            in_flight = self.tools.len(),
            "Session draining"
        );
        self.cause = Some(cause);
        self.drain_deadline = Some(Instant::now() + self.settings.drain_timeout);
    }

    /// Queue `session_terminated` for the client, waiting out a full queue
    /// for at most [`TERMINATION_NOTICE_TIMEOUT`].
    async fn send_termination_notice(&mut self, cause: &TerminationCause) {
        let notice = Event::new(
            self.next_sequence(),
            EventKind::SessionControl(SessionControl::Terminated {
                cause: cause.clone(),
            }),
        );

        let result = match self.client.send(notice) {
            Err(ConnectorError::Backpressure { event, .. }) => {
                match tokio::time::timeout(
                    TERMINATION_NOTICE_TIMEOUT,
                    self.client.send_when_ready(*event),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            session_id = %self.handle.id(),
                            timeout_ms = TERMINATION_NOTICE_TIMEOUT.as_millis() as u64,
                            "Client queue stayed full, termination notice not delivered"
                        );
                        return;
                    }
                }
            }
            other => other,
        };

        if let Err(e) = result {
            debug!(session_id = %self.handle.id(), "Termination notice not delivered: {}", e);
        }
    }

    /// Abort tool tasks, tell the client why, close both peers.
    async fn terminate(&mut self, cause: TerminationCause) -> SessionSummary {
        let aborted = self.tools.len();
        self.tools.abort_all();
        if aborted > 0 {
            warn!(session_id = %self.handle.id(), aborted, "Cancelled in-flight tool calls");
        }
        while self.tools.join_next().await.is_some() {}

        let was_routing = self.transitions.contains(&SessionState::Active);
        self.transition(SessionState::Terminated);

        // A client that opened before setup failed still learns why.
        if was_routing || self.client.state() == ConnectionState::Open {
            self.send_termination_notice(&cause).await;
        }

        let (client, upstream) = tokio::join!(self.client.close(), self.upstream.close());
        if let Err(e) = client {
            debug!(session_id = %self.handle.id(), "Client close failed: {}", e);
        }
        if let Err(e) = upstream {
            debug!(session_id = %self.handle.id(), "Upstream close failed: {}", e);
        }

        info!(session_id = %self.handle.id(), cause = %cause, "Session terminated");
        self.registry.publish(LifecycleEvent::Terminated {
            session_id: self.handle.id().to_string(),
            cause: cause.clone(),
        });

        SessionSummary {
            session_id: self.handle.id().to_string(),
            cause,
            transitions: self.transitions.clone(),
        }
    }
}

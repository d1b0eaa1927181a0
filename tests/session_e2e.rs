//! End-to-end session tests
//!
//! Drive a full [`SessionCoordinator`] with in-memory connectors on both
//! sides and check what each peer observes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};

use cine_bridge::core::peer::{ChannelConnector, ChannelRemote};
use cine_bridge::core::session::{
    CoordinatorSettings, LifecycleEvent, SessionCoordinator, SessionHandle, SessionRegistry,
    SessionState, SessionSummary, WaitHint,
};
use cine_bridge::core::tools::{Tool, ToolDispatcher, ToolResult};
use cine_bridge::{
    ClientMessage, ConnectorError, EventKind, Peer, Role, SessionControl, TerminationCause,
    ToolCallRequest, ToolCallStatus, UpstreamMessage,
};

const WAIT: Duration = Duration::from_secs(3);

/// Looks up a film, optionally slowly.
struct FilmLookup;

#[async_trait]
impl Tool for FilmLookup {
    fn name(&self) -> &str {
        "film_lookup"
    }

    fn description(&self) -> &str {
        "Look up a film by title"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"title": {"type": "string"}},
            "required": ["title"]
        })
    }

    async fn invoke(&self, arguments: Value) -> ToolResult<Value> {
        if let Some(ms) = arguments.get("sleep_ms").and_then(Value::as_u64) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        let title = arguments["title"].as_str().unwrap_or_default();
        if arguments.get("direct").and_then(Value::as_bool) == Some(true) {
            return Ok(json!({"return_direct": true, "title": title}));
        }
        Ok(json!(format!("{title} (1979), directed by Ridley Scott")))
    }
}

struct Session {
    client: ChannelRemote,
    upstream: ChannelRemote,
    registry: Arc<SessionRegistry>,
    handle: Arc<SessionHandle>,
    task: tokio::task::JoinHandle<SessionSummary>,
}

struct SessionOptions {
    settings: CoordinatorSettings,
    tool_timeout: Duration,
    client_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            settings: CoordinatorSettings::default(),
            tool_timeout: Duration::from_secs(2),
            client_capacity: 64,
        }
    }
}

fn start_session(id: &str, options: SessionOptions) -> Session {
    start_session_in(Arc::new(SessionRegistry::new()), id, options)
}

fn start_session_in(registry: Arc<SessionRegistry>, id: &str, options: SessionOptions) -> Session {
    let (client, client_remote) = ChannelConnector::pair(Peer::Client, options.client_capacity);
    let (upstream, upstream_remote) = ChannelConnector::pair(Peer::Upstream, 64);
    let handle = Arc::new(SessionHandle::new(id, "en"));
    let dispatcher = Arc::new(ToolDispatcher::new(
        vec![Arc::new(FilmLookup)],
        4,
        options.tool_timeout,
    ));

    let coordinator = SessionCoordinator::new(
        handle.clone(),
        registry.clone(),
        Box::new(client),
        Box::new(upstream),
        dispatcher,
        options.settings,
    );

    Session {
        client: client_remote,
        upstream: upstream_remote,
        registry,
        handle,
        task: tokio::spawn(coordinator.run()),
    }
}

fn user_text(text: &str) -> EventKind {
    EventKind::ClientMessage(ClientMessage::Text {
        role: Role::User,
        text: text.to_string(),
    })
}

fn tool_call(call_id: &str, arguments: Value) -> EventKind {
    EventKind::ToolCallRequest(ToolCallRequest {
        call_id: call_id.to_string(),
        name: "film_lookup".to_string(),
        arguments: arguments.to_string(),
    })
}

fn text_done(text: &str) -> EventKind {
    EventKind::UpstreamMessage(UpstreamMessage::TextDone {
        response_id: Some("resp_1".to_string()),
        item_id: None,
        text: text.to_string(),
    })
}

async fn expect_started(client: &mut ChannelRemote) -> u64 {
    let event = client.recv_timeout(WAIT).await.expect("connection_established");
    match event.kind() {
        EventKind::SessionControl(SessionControl::Started { language, .. }) => {
            assert_eq!(language, "en");
        }
        other => panic!("Expected Started, got {other:?}"),
    }
    event.sequence()
}

/// The `run_tool` notice sent to the client when a tool starts.
async fn expect_run_tool(client: &mut ChannelRemote) -> u64 {
    let event = client.recv_timeout(WAIT).await.expect("run_tool notification");
    match event.kind() {
        EventKind::SessionControl(SessionControl::Notification { event_id }) => {
            assert_eq!(event_id, "run_tool");
        }
        other => panic!("Expected run_tool notification, got {other:?}"),
    }
    event.sequence()
}

#[tokio::test]
async fn test_tool_round_trip_is_invisible_to_client() {
    let mut s = start_session("round-trip", SessionOptions::default());
    expect_started(&mut s.client).await;

    s.client.inject(user_text("Who directed Alien?")).await;
    let forwarded = s.upstream.recv_timeout(WAIT).await.unwrap();
    assert_eq!(forwarded.kind(), &user_text("Who directed Alien?"));

    s.upstream
        .inject(tool_call("call_alien", json!({"title": "Alien"})))
        .await;
    let result = s.upstream.recv_timeout(WAIT).await.unwrap();
    match result.kind() {
        EventKind::ToolCallResult(r) => {
            assert_eq!(r.call_id, "call_alien");
            assert_eq!(r.status, ToolCallStatus::Completed);
            assert_eq!(r.output, "Alien (1979), directed by Ridley Scott");
        }
        other => panic!("Expected tool result, got {other:?}"),
    }

    // Only the activity notice tells the client a tool ran.
    expect_run_tool(&mut s.client).await;

    s.upstream.inject(text_done("Ridley Scott directed Alien.")).await;
    let reply = s.client.recv_timeout(WAIT).await.unwrap();
    assert_eq!(reply.kind(), &text_done("Ridley Scott directed Alien."));

    // Nothing else reached the client.
    assert!(s.client.drain().is_empty());

    s.client.close(None).await;
    let summary = tokio::time::timeout(WAIT, s.task).await.unwrap().unwrap();
    assert_eq!(summary.cause, TerminationCause::ClientClosed);
}

#[tokio::test]
async fn test_sequences_strictly_increase_per_peer() {
    let mut s = start_session("ordering", SessionOptions::default());
    let started = expect_started(&mut s.client).await;

    for i in 0..20 {
        s.client.inject(user_text(&format!("message {i}"))).await;
        s.upstream.inject(text_done(&format!("reply {i}"))).await;
    }

    let mut upstream_seen = Vec::new();
    while upstream_seen.len() < 20 {
        let event = s.upstream.recv_timeout(WAIT).await.expect("forwarded");
        upstream_seen.push(event);
    }
    let mut client_seen = Vec::new();
    while client_seen.len() < 20 {
        let event = s.client.recv_timeout(WAIT).await.expect("reply");
        client_seen.push(event);
    }

    // Per-source order is preserved.
    for (i, event) in upstream_seen.iter().enumerate() {
        assert_eq!(event.kind(), &user_text(&format!("message {i}")));
    }
    for (i, event) in client_seen.iter().enumerate() {
        assert_eq!(event.kind(), &text_done(&format!("reply {i}")));
    }

    // Sequences are strictly increasing and unique across both peers.
    let client_sequences: Vec<u64> = client_seen.iter().map(|e| e.sequence()).collect();
    assert!(client_sequences.windows(2).all(|w| w[0] < w[1]));
    assert!(client_sequences[0] > started);
    let upstream_sequences: Vec<u64> = upstream_seen.iter().map(|e| e.sequence()).collect();
    assert!(upstream_sequences.windows(2).all(|w| w[0] < w[1]));
    for seq in &upstream_sequences {
        assert!(!client_sequences.contains(seq));
    }

    s.upstream.close(None).await;
    tokio::time::timeout(WAIT, s.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_client_text_and_tool_results_keep_arrival_order_upstream() {
    let mut s = start_session("interleaved", SessionOptions::default());
    expect_started(&mut s.client).await;

    s.client.inject(user_text("before the tool")).await;
    s.upstream
        .inject(tool_call("call_mid", json!({"title": "Paprika", "sleep_ms": 150})))
        .await;
    // Arrives while the tool is still running.
    s.client.inject(user_text("while the tool runs")).await;

    let first = s.upstream.recv_timeout(WAIT).await.unwrap();
    assert_eq!(first.kind(), &user_text("before the tool"));
    let second = s.upstream.recv_timeout(WAIT).await.unwrap();
    assert_eq!(second.kind(), &user_text("while the tool runs"));
    let third = s.upstream.recv_timeout(WAIT).await.unwrap();
    match third.kind() {
        EventKind::ToolCallResult(r) => {
            assert_eq!(r.call_id, "call_mid");
            assert_eq!(r.output, "Paprika (1979), directed by Ridley Scott");
        }
        other => panic!("Expected tool result, got {other:?}"),
    }

    s.client.inject(user_text("after the tool")).await;
    let fourth = s.upstream.recv_timeout(WAIT).await.unwrap();
    assert_eq!(fourth.kind(), &user_text("after the tool"));

    let sequences: Vec<u64> = [&first, &second, &third, &fourth]
        .iter()
        .map(|e| e.sequence())
        .collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    assert!(s.upstream.drain().is_empty());

    s.client.close(None).await;
    tokio::time::timeout(WAIT, s.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_tool_timeout_keeps_session_active() {
    let options = SessionOptions {
        tool_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let mut s = start_session("tool-timeout", options);
    expect_started(&mut s.client).await;

    s.upstream
        .inject(tool_call("slow", json!({"title": "Solaris", "sleep_ms": 1000})))
        .await;
    let result = s.upstream.recv_timeout(WAIT).await.unwrap();
    match result.kind() {
        EventKind::ToolCallResult(r) => {
            assert_eq!(r.call_id, "slow");
            assert_eq!(r.status, ToolCallStatus::TimedOut);
        }
        other => panic!("Expected timed out result, got {other:?}"),
    }
    assert_eq!(s.handle.state(), SessionState::Active);

    // Still routing afterwards.
    s.client.inject(user_text("still there?")).await;
    let forwarded = s.upstream.recv_timeout(WAIT).await.unwrap();
    assert_eq!(forwarded.kind(), &user_text("still there?"));

    s.client.close(None).await;
    tokio::time::timeout(WAIT, s.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_in_flight_tool_bounded_by_drain_timeout() {
    let options = SessionOptions {
        settings: CoordinatorSettings {
            drain_timeout: Duration::from_millis(100),
            ..Default::default()
        },
        tool_timeout: Duration::from_secs(30),
        ..Default::default()
    };
    let mut s = start_session("drain-timeout", options);
    expect_started(&mut s.client).await;

    s.upstream
        .inject(tool_call("stuck", json!({"title": "Stalker", "sleep_ms": 10_000})))
        .await;
    // Let the tool task start before the client leaves.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let closed_at = Instant::now();
    s.client.close(None).await;
    let summary = tokio::time::timeout(WAIT, s.task).await.unwrap().unwrap();
    assert!(closed_at.elapsed() < Duration::from_secs(2));
    assert_eq!(summary.cause, TerminationCause::ClientClosed);
    assert!(summary.reached(SessionState::Draining));

    // The cancelled result was never routed upstream.
    let routed: Vec<_> = s
        .upstream
        .drain()
        .into_iter()
        .filter(|e| matches!(e.kind(), EventKind::ToolCallResult(_)))
        .collect();
    assert!(routed.is_empty());
}

#[tokio::test]
async fn test_tool_finishing_within_drain_window_is_discarded() {
    let options = SessionOptions {
        settings: CoordinatorSettings {
            drain_timeout: Duration::from_secs(2),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut s = start_session("drain-complete", options);
    expect_started(&mut s.client).await;

    s.upstream
        .inject(tool_call("short", json!({"title": "Heat", "sleep_ms": 100})))
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    s.upstream.close(None).await;

    let summary = tokio::time::timeout(WAIT, s.task).await.unwrap().unwrap();
    assert_eq!(summary.cause, TerminationCause::UpstreamClosed);
    assert!(
        s.upstream
            .drain()
            .iter()
            .all(|e| !matches!(e.kind(), EventKind::ToolCallResult(_)))
    );
}

#[tokio::test]
async fn test_return_direct_result_reaches_both_peers() {
    let mut s = start_session("direct", SessionOptions::default());
    expect_started(&mut s.client).await;

    s.upstream
        .inject(tool_call("call_direct", json!({"title": "Ran", "direct": true})))
        .await;

    let notified = expect_run_tool(&mut s.client).await;
    let to_client = s.client.recv_timeout(WAIT).await.unwrap();
    let to_upstream = s.upstream.recv_timeout(WAIT).await.unwrap();
    for event in [&to_client, &to_upstream] {
        match event.kind() {
            EventKind::ToolCallResult(r) => {
                assert_eq!(r.call_id, "call_direct");
                assert!(r.is_return_direct());
            }
            other => panic!("Expected tool result, got {other:?}"),
        }
    }
    assert!(notified < to_client.sequence());
    assert!(to_client.sequence() < to_upstream.sequence());

    s.client.close(None).await;
    tokio::time::timeout(WAIT, s.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_wait_hint_sent_for_slow_tool() {
    let options = SessionOptions {
        settings: CoordinatorSettings {
            wait_hint: Some(WaitHint {
                audio: Arc::from("UklGRg=="),
                delay: Duration::from_millis(30),
            }),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut s = start_session("wait-hint", options);
    expect_started(&mut s.client).await;

    s.upstream
        .inject(tool_call("call_slow", json!({"title": "Ikiru", "sleep_ms": 300})))
        .await;

    expect_run_tool(&mut s.client).await;
    let hint = s.client.recv_timeout(WAIT).await.unwrap();
    match hint.kind() {
        EventKind::UpstreamMessage(UpstreamMessage::AudioDelta { delta, .. }) => {
            assert_eq!(delta, "UklGRg==");
        }
        other => panic!("Expected wait hint audio, got {other:?}"),
    }
    let result = s.upstream.recv_timeout(WAIT).await.unwrap();
    assert!(matches!(result.kind(), EventKind::ToolCallResult(_)));

    s.client.close(None).await;
    tokio::time::timeout(WAIT, s.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_saturated_client_queue_recovers_once_drained() {
    let options = SessionOptions {
        client_capacity: 2,
        ..Default::default()
    };
    let mut s = start_session("backpressure", options);

    // Nobody reads the client queue while upstream floods it.
    for i in 0..10 {
        s.upstream.inject(text_done(&format!("chunk {i}"))).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(s.handle.state(), SessionState::Active);

    expect_started(&mut s.client).await;
    for i in 0..10 {
        let event = s.client.recv_timeout(WAIT).await.expect("delivered after backpressure");
        assert_eq!(event.kind(), &text_done(&format!("chunk {i}")));
    }

    s.client.close(None).await;
    tokio::time::timeout(WAIT, s.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_full_queue_reports_backpressure() {
    use cine_bridge::Connector;
    use cine_bridge::core::events::Event;

    let (connector, mut remote) = ChannelConnector::pair(Peer::Client, 1);
    connector.open().await.unwrap();
    connector.send(Event::new(0, text_done("a"))).unwrap();

    let err = connector.send(Event::new(1, text_done("b"))).unwrap_err();
    let ConnectorError::Backpressure { event, .. } = err else {
        panic!("Expected backpressure");
    };
    assert_eq!(event.sequence(), 1);

    assert_eq!(remote.recv().await.unwrap().sequence(), 0);
    connector.send(*event).unwrap();
    assert_eq!(remote.recv().await.unwrap().sequence(), 1);
}

#[tokio::test]
async fn test_shutdown_drains_every_session() {
    let registry = Arc::new(SessionRegistry::new());
    let mut events = registry.subscribe();
    let mut a = start_session_in(registry.clone(), "a", SessionOptions::default());
    let mut b = start_session_in(registry.clone(), "b", SessionOptions::default());
    expect_started(&mut a.client).await;
    expect_started(&mut b.client).await;

    assert_eq!(registry.drain_all(), 2);
    assert!(registry.wait_idle(WAIT).await);

    for task in [a.task, b.task] {
        let summary = task.await.unwrap();
        assert_eq!(summary.cause, TerminationCause::Shutdown);
    }

    let mut terminated = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, LifecycleEvent::Terminated { .. }) {
            terminated += 1;
        }
    }
    assert_eq!(terminated, 2);
}

#[tokio::test]
async fn test_terminating_twice_is_noop() {
    let mut s = start_session("twice", SessionOptions::default());
    expect_started(&mut s.client).await;

    assert!(s.registry.terminate("twice"));
    assert!(!s.registry.terminate("twice"));
    let summary = tokio::time::timeout(WAIT, s.task).await.unwrap().unwrap();
    assert_eq!(summary.cause, TerminationCause::Terminated);
    assert_eq!(s.handle.state(), SessionState::Terminated);
    assert!(!s.registry.terminate("twice"));
}

#[tokio::test]
async fn test_malformed_client_frame_is_reported_and_session_survives() {
    let mut s = start_session("malformed", SessionOptions::default());
    expect_started(&mut s.client).await;

    s.client.inject_malformed("expected value at line 1").await;
    let error = s.client.recv_timeout(WAIT).await.unwrap();
    match error.kind() {
        EventKind::SessionControl(SessionControl::Error { code, .. }) => {
            assert_eq!(code, "parse_error");
        }
        other => panic!("Expected parse error, got {other:?}"),
    }
    assert_eq!(s.handle.state(), SessionState::Active);

    s.client.fail("connection reset").await;
    let summary = tokio::time::timeout(WAIT, s.task).await.unwrap().unwrap();
    assert!(matches!(
        summary.cause,
        TerminationCause::PeerError {
            peer: Peer::Client,
            ..
        }
    ));
}

//! Integration tests for the OpenAI Realtime connector
//!
//! These tests run the connector against a local mock server and verify:
//! - Handshake headers and the model query parameter
//! - `session.update` is the first frame sent
//! - Outbound translation (text, response.create, tool output)
//! - Inbound translation, including function call name correlation
//! - Close handling

mod mock_providers;

use std::time::Duration;

use futures::StreamExt;
use serde_json::json;

use cine_bridge::core::events::Event;
use cine_bridge::core::tools::ToolDefinition;
use cine_bridge::core::upstream::openai::DEFAULT_INSTRUCTIONS;
use cine_bridge::{
    ClientMessage, ConnectionState, Connector, ConnectorError, EventKind, OpenAIConnector,
    Received, RealtimeVoice, Role, ToolCallResult, ToolCallStatus, UpstreamMessage,
    UpstreamSettings,
};
use mock_providers::MockRealtimeServer;

fn settings(url: &str, text_mode: bool) -> UpstreamSettings {
    UpstreamSettings {
        url: url.to_string(),
        api_key: "sk-mock".to_string(),
        model: "gpt-mock-realtime".to_string(),
        voice: RealtimeVoice::Alloy,
        text_mode,
        instructions: format!("{DEFAULT_INSTRUCTIONS}\nPreferred response language: en"),
        tools: vec![ToolDefinition {
            name: "tmdb_movie_search".to_string(),
            description: "Search movies".to_string(),
            parameters: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        }],
        ..Default::default()
    }
}

async fn next_event(stream: &mut cine_bridge::EventStream) -> Received {
    tokio::time::timeout(Duration::from_secs(3), stream.next())
        .await
        .expect("timed out waiting for upstream event")
        .expect("stream ended")
}

#[tokio::test]
async fn test_handshake_and_session_update_first() {
    let mut server = MockRealtimeServer::start().await;
    let connector = OpenAIConnector::new(settings(&server.url, true));

    connector.open().await.unwrap();
    assert_eq!(connector.state(), ConnectionState::Open);

    let mut conn = server.accept().await;
    assert_eq!(conn.authorization.as_deref(), Some("Bearer sk-mock"));
    assert_eq!(conn.beta.as_deref(), Some("realtime=v1"));
    assert_eq!(conn.path_and_query, "/v1/realtime?model=gpt-mock-realtime");

    let first = conn.recv().await.unwrap();
    assert_eq!(first["type"], "session.update");
    assert_eq!(first["session"]["modalities"], json!(["text"]));
    assert_eq!(first["session"]["tools"][0]["name"], "tmdb_movie_search");
    assert_eq!(first["session"]["tool_choice"], "auto");
    assert!(
        first["session"]["instructions"]
            .as_str()
            .unwrap()
            .ends_with("Preferred response language: en")
    );

    connector.close().await.unwrap();
    assert_eq!(connector.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_user_text_is_followed_by_response_create() {
    let mut server = MockRealtimeServer::start().await;
    let connector = OpenAIConnector::new(settings(&server.url, false));
    connector.open().await.unwrap();
    let mut conn = server.accept().await;
    conn.recv_type("session.update").await.unwrap();

    connector
        .send(Event::new(
            7,
            EventKind::ClientMessage(ClientMessage::Text {
                role: Role::User,
                text: "Recommend a Kurosawa film".to_string(),
            }),
        ))
        .unwrap();

    let item = conn.recv().await.unwrap();
    assert_eq!(item["type"], "conversation.item.create");
    assert_eq!(item["event_id"], "evt_7");
    assert_eq!(item["item"]["role"], "user");
    assert_eq!(item["item"]["content"][0]["text"], "Recommend a Kurosawa film");

    let response = conn.recv().await.unwrap();
    assert_eq!(response["type"], "response.create");
    assert_eq!(response["response"]["voice"], "alloy");

    connector.close().await.unwrap();
}

#[tokio::test]
async fn test_function_call_name_is_correlated() {
    let mut server = MockRealtimeServer::start().await;
    let connector = OpenAIConnector::new(settings(&server.url, true));
    connector.open().await.unwrap();
    let mut stream = connector.receive().unwrap();
    let conn = server.accept().await;

    conn.call_function("call_42", "tmdb_movie_search", json!({"query": "Ran"}));

    match next_event(&mut stream).await {
        Received::Event(EventKind::ToolCallRequest(request)) => {
            assert_eq!(request.call_id, "call_42");
            assert_eq!(request.name, "tmdb_movie_search");
            assert_eq!(request.arguments, r#"{"query":"Ran"}"#);
        }
        other => panic!("Expected tool call request, got {other:?}"),
    }

    connector.close().await.unwrap();
}

#[tokio::test]
async fn test_tool_output_sent_as_function_call_output() {
    let mut server = MockRealtimeServer::start().await;
    let connector = OpenAIConnector::new(settings(&server.url, true));
    connector.open().await.unwrap();
    let mut conn = server.accept().await;
    conn.recv_type("session.update").await.unwrap();

    connector
        .send(Event::new(
            3,
            EventKind::ToolCallResult(ToolCallResult {
                call_id: "call_42".to_string(),
                status: ToolCallStatus::Completed,
                output: "Ran (1985)".to_string(),
            }),
        ))
        .unwrap();

    let item = conn.recv().await.unwrap();
    assert_eq!(item["type"], "conversation.item.create");
    assert_eq!(item["item"]["type"], "function_call_output");
    assert_eq!(item["item"]["call_id"], "call_42");
    assert_eq!(item["item"]["output"], "Ran (1985)");
    let response = conn.recv().await.unwrap();
    assert_eq!(response["type"], "response.create");

    connector.close().await.unwrap();
}

#[tokio::test]
async fn test_ignored_and_malformed_frames() {
    let mut server = MockRealtimeServer::start().await;
    let connector = OpenAIConnector::new(settings(&server.url, true));
    connector.open().await.unwrap();
    let mut stream = connector.receive().unwrap();
    let conn = server.accept().await;

    conn.send(json!({"type": "rate_limits.updated", "rate_limits": []}));
    conn.send(json!({"type": "response.text.delta", "delta": "Ra"}));
    conn.send_raw("{not json");
    conn.respond_text("resp_1", "Ran is a 1985 film.");

    match next_event(&mut stream).await {
        Received::Transient(ConnectorError::MalformedFrame { .. }) => {}
        other => panic!("Expected malformed frame, got {other:?}"),
    }
    assert_eq!(
        next_event(&mut stream).await,
        Received::Event(EventKind::UpstreamMessage(UpstreamMessage::TextDone {
            response_id: Some("resp_1".to_string()),
            item_id: Some("item_text".to_string()),
            text: "Ran is a 1985 film.".to_string(),
        }))
    );
    assert_eq!(
        next_event(&mut stream).await,
        Received::Event(EventKind::UpstreamMessage(UpstreamMessage::TurnComplete {
            response_id: Some("resp_1".to_string()),
            status: Some("completed".to_string()),
        }))
    );

    connector.close().await.unwrap();
}

#[tokio::test]
async fn test_server_close_ends_stream() {
    let mut server = MockRealtimeServer::start().await;
    let connector = OpenAIConnector::new(settings(&server.url, true));
    connector.open().await.unwrap();
    let mut stream = connector.receive().unwrap();
    let conn = server.accept().await;

    conn.close();
    assert!(matches!(
        next_event(&mut stream).await,
        Received::Closed { .. }
    ));
    assert_eq!(connector.state(), ConnectionState::Closed);
    connector.close().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_server_fails_to_open() {
    let connector = OpenAIConnector::new(settings("ws://127.0.0.1:1/v1/realtime", true));
    let err = connector.open().await.unwrap_err();
    assert!(matches!(err, ConnectorError::ConnectionFailed { .. }));
    assert_eq!(connector.state(), ConnectionState::Closed);
}

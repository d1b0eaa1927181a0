//! Mock OpenAI Realtime server
//!
//! Accepts WebSocket connections on a random local port, records every
//! frame a connection sends and lets the test push server events back.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;

/// One accepted connection.
pub struct MockConnection {
    /// Headers of the upgrade request
    pub authorization: Option<String>,
    pub beta: Option<String>,
    pub path_and_query: String,
    received: mpsc::UnboundedReceiver<Value>,
    outgoing: mpsc::UnboundedSender<Message>,
}

impl MockConnection {
    /// Next JSON frame sent by the bridge.
    pub async fn recv(&mut self) -> Option<Value> {
        tokio::time::timeout(Duration::from_secs(3), self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next frame of the given `type`, skipping others.
    pub async fn recv_type(&mut self, event_type: &str) -> Option<Value> {
        loop {
            let frame = self.recv().await?;
            if frame["type"] == event_type {
                return Some(frame);
            }
        }
    }

    /// Send a server event.
    pub fn send(&self, event: Value) {
        let _ = self.outgoing.send(Message::Text(event.to_string().into()));
    }

    /// Send a raw text frame.
    pub fn send_raw(&self, text: &str) {
        let _ = self.outgoing.send(Message::Text(text.to_string().into()));
    }

    /// Close the connection from the server side.
    pub fn close(&self) {
        let _ = self.outgoing.send(Message::Close(None));
    }

    /// Announce a function call and deliver its arguments.
    pub fn call_function(&self, call_id: &str, name: &str, arguments: Value) {
        self.send(json!({
            "type": "response.output_item.added",
            "response_id": "resp_tool",
            "item": {
                "id": format!("item_{call_id}"),
                "type": "function_call",
                "call_id": call_id,
                "name": name,
            }
        }));
        self.send(json!({
            "type": "response.function_call_arguments.done",
            "item_id": format!("item_{call_id}"),
            "call_id": call_id,
            "arguments": arguments.to_string(),
        }));
    }

    /// Complete a text response.
    pub fn respond_text(&self, response_id: &str, text: &str) {
        self.send(json!({
            "type": "response.text.done",
            "response_id": response_id,
            "item_id": "item_text",
            "text": text,
        }));
        self.send(json!({
            "type": "response.done",
            "response": {"id": response_id, "status": "completed"}
        }));
    }
}

/// Mock OpenAI Realtime WebSocket server.
pub struct MockRealtimeServer {
    pub url: String,
    connections: mpsc::UnboundedReceiver<MockConnection>,
    _shutdown: oneshot::Sender<()>,
}

impl MockRealtimeServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        let conn_tx = conn_tx.clone();
                        tokio::spawn(handle_connection(stream, conn_tx));
                    }
                }
            }
        });

        Self {
            url: format!("ws://{addr}/v1/realtime"),
            connections: conn_rx,
            _shutdown: shutdown_tx,
        }
    }

    /// Wait for the next accepted connection.
    pub async fn accept(&mut self) -> MockConnection {
        tokio::time::timeout(Duration::from_secs(3), self.connections.recv())
            .await
            .expect("no connection within timeout")
            .expect("mock server stopped")
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    conn_tx: mpsc::UnboundedSender<MockConnection>,
) {
    let (headers_tx, headers_rx) = oneshot::channel();
    let callback = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let _ = headers_tx.send((
            header("Authorization"),
            header("OpenAI-Beta"),
            request
                .uri()
                .path_and_query()
                .map(|p| p.to_string())
                .unwrap_or_default(),
        ));
        // The client requests the `realtime` subprotocol and expects it echoed.
        response
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("realtime"));
        Ok(response)
    };

    let Ok(ws_stream) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let Ok((authorization, beta, path_and_query)) = headers_rx.await else {
        return;
    };

    let (mut write, mut read) = ws_stream.split();
    let (received_tx, received_rx) = mpsc::unbounded_channel();
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();

    let _ = conn_tx.send(MockConnection {
        authorization,
        beta,
        path_and_query,
        received: received_rx,
        outgoing: outgoing_tx,
    });

    let _ = write
        .send(Message::Text(
            json!({"type": "session.created", "session": {"id": "sess_mock"}})
                .to_string()
                .into(),
        ))
        .await;

    loop {
        tokio::select! {
            outgoing = outgoing_rx.recv() => {
                let Some(message) = outgoing else { break };
                let closing = matches!(message, Message::Close(_));
                if write.send(message).await.is_err() || closing {
                    break;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                        let _ = received_tx.send(value);
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    }
}

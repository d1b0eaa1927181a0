//! OpenAI Realtime upstream connector.
//!
//! One WebSocket per session. `open` performs the handshake and sends the
//! initial `session.update` before any session event, then splits the socket
//! into a writer task (outbound queue and pong replies) and a reader task
//! (server frames into the inbound stream). Neither task ever waits on the
//! other, so a full inbound queue cannot stall outbound traffic.
//!
//! The upstream announces function call names in `response.output_item.added`
//! and the arguments later in `response.function_call_arguments.done`; the
//! reader joins the two by `call_id` before emitting a `ToolCallRequest`.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use super::config::UpstreamSettings;
use crate::core::codec::{UpstreamCodec, UpstreamFrame, decode_server_frame};
use crate::core::events::{Event, EventKind, Peer};
use crate::core::peer::{
    ConnectionState, Connector, ConnectorError, ConnectorResult, EventStream, InboundSink,
    PeerLink,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Pong replies waiting for the writer. Extra pings are dropped.
const CONTROL_CHANNEL_CAPACITY: usize = 8;

/// Connector to the OpenAI Realtime API.
pub struct OpenAIConnector {
    settings: UpstreamSettings,
    codec: UpstreamCodec,
    link: PeerLink,
}

impl OpenAIConnector {
    pub fn new(settings: UpstreamSettings) -> Self {
        let codec = UpstreamCodec::new(settings.text_mode, settings.voice);
        let link = PeerLink::new(
            Peer::Upstream,
            settings.queue_capacity,
            settings.close_timeout,
        );
        Self {
            settings,
            codec,
            link,
        }
    }

    pub fn settings(&self) -> &UpstreamSettings {
        &self.settings
    }

    fn connection_failed(&self, reason: impl Into<String>) -> ConnectorError {
        self.link.set_state(ConnectionState::Closed);
        ConnectorError::ConnectionFailed {
            peer: Peer::Upstream,
            reason: reason.into(),
        }
    }

    fn build_request(&self) -> ConnectorResult<http::Request<()>> {
        let host = self
            .settings
            .host()
            .ok_or_else(|| self.connection_failed(format!("invalid URL: {}", self.settings.url)))?;

        http::Request::builder()
            .uri(self.settings.ws_url())
            .header("Authorization", format!("Bearer {}", self.settings.api_key))
            .header("OpenAI-Beta", "realtime=v1")
            .header("Sec-WebSocket-Protocol", "realtime")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host)
            .body(())
            .map_err(|e| self.connection_failed(e.to_string()))
    }
}

#[async_trait]
impl Connector for OpenAIConnector {
    fn peer(&self) -> Peer {
        Peer::Upstream
    }

    fn state(&self) -> ConnectionState {
        self.link.state()
    }

    async fn open(&self) -> ConnectorResult<()> {
        match self.link.state() {
            ConnectionState::Open => return Ok(()),
            ConnectionState::Closing | ConnectionState::Closed => {
                return Err(ConnectorError::Closed {
                    peer: Peer::Upstream,
                });
            }
            ConnectionState::Connecting => {}
        }

        if self.settings.api_key.is_empty() {
            return Err(self.connection_failed("OpenAI API key is not configured"));
        }

        let request = self.build_request()?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| self.connection_failed(e.to_string()))?;

        info!(model = %self.settings.model, "Connected to OpenAI Realtime API");

        let (mut ws_sink, ws_source) = ws_stream.split();

        // Session configuration goes out before any routed event.
        let session_update = self
            .codec
            .session_update(&self.settings.instructions, &self.settings.tools)
            .map_err(|e| self.connection_failed(e.to_string()))?;
        ws_sink
            .send(Message::Text(session_update.into()))
            .await
            .map_err(|e| self.connection_failed(e.to_string()))?;

        let outbound = self
            .link
            .take_outbound()
            .ok_or_else(|| self.connection_failed("connector was already opened"))?;
        let (control_tx, control_rx) = mpsc::channel::<Message>(CONTROL_CHANNEL_CAPACITY);

        self.link.set_state(ConnectionState::Open);

        self.link.attach(tokio::spawn(write_loop(
            ws_sink,
            outbound,
            control_rx,
            self.codec,
        )));
        self.link.attach(tokio::spawn(read_loop(
            ws_source,
            self.link.inbound_sink(),
            control_tx,
        )));

        Ok(())
    }

    fn send(&self, event: Event) -> ConnectorResult<()> {
        self.link.send(event)
    }

    async fn send_when_ready(&self, event: Event) -> ConnectorResult<()> {
        self.link.send_when_ready(event).await
    }

    fn receive(&self) -> Option<EventStream> {
        self.link.receive()
    }

    async fn close(&self) -> ConnectorResult<()> {
        self.link.close().await
    }
}

/// Drain the outbound queue into the socket. Ends with a close frame once
/// the queue is closed and empty.
async fn write_loop(
    mut ws_sink: WsSink,
    mut outbound: mpsc::Receiver<Event>,
    mut control: mpsc::Receiver<Message>,
    codec: UpstreamCodec,
) {
    loop {
        tokio::select! {
            biased;

            Some(message) = control.recv() => {
                if let Err(e) = ws_sink.send(message).await {
                    warn!("Failed to send control frame upstream: {}", e);
                    return;
                }
            }

            event = outbound.recv() => {
                let Some(event) = event else {
                    break;
                };
                let frames = match codec.encode(&event) {
                    Ok(frames) => frames,
                    Err(e) => {
                        error!(
                            sequence = event.sequence(),
                            kind = event.kind().label(),
                            "Failed to encode upstream event: {}", e
                        );
                        continue;
                    }
                };
                for frame in frames {
                    if let Err(e) = ws_sink.send(Message::Text(frame.into())).await {
                        error!("Failed to send upstream frame: {}", e);
                        return;
                    }
                }
            }
        }
    }

    debug!("Upstream outbound queue closed, sending close frame");
    let _ = ws_sink.send(Message::Close(None)).await;
    let _ = ws_sink.close().await;
}

/// Decode server frames into the inbound stream until the socket ends or
/// the link starts closing.
async fn read_loop(mut ws_source: WsSource, sink: InboundSink, control: mpsc::Sender<Message>) {
    let mut pending_calls: HashMap<String, String> = HashMap::new();

    loop {
        let message = tokio::select! {
            _ = sink.shutdown_requested() => return,
            message = ws_source.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                let kind = match decode_server_frame(text.as_str()) {
                    Ok(UpstreamFrame::Event(kind)) => kind,
                    Ok(UpstreamFrame::FunctionCallAnnounced { call_id, name }) => {
                        debug!(call_id = %call_id, name = %name, "Function call announced");
                        pending_calls.insert(call_id, name);
                        continue;
                    }
                    Ok(UpstreamFrame::Ignored(event_type)) => {
                        trace!(event_type, "Ignoring upstream event");
                        continue;
                    }
                    Err(e) => {
                        warn!("Malformed upstream frame: {}", e);
                        if !sink
                            .transient(ConnectorError::MalformedFrame {
                                peer: Peer::Upstream,
                                reason: e.to_string(),
                            })
                            .await
                        {
                            return;
                        }
                        continue;
                    }
                };

                let kind = match kind {
                    EventKind::ToolCallRequest(mut request) => {
                        let announced = pending_calls.remove(&request.call_id);
                        if request.name.is_empty() {
                            request.name = announced.unwrap_or_default();
                        }
                        EventKind::ToolCallRequest(request)
                    }
                    other => other,
                };

                if !sink.event(kind).await {
                    return;
                }
            }
            Some(Ok(Message::Ping(data))) => {
                if control.try_send(Message::Pong(data)).is_err() {
                    trace!("Pong dropped, control channel full");
                }
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|f| f.reason.as_str().to_string())
                    .filter(|r| !r.is_empty());
                info!(reason = ?reason, "Upstream closed the connection");
                sink.closed(reason).await;
                return;
            }
            Some(Ok(Message::Binary(_))) => {
                debug!("Ignoring binary frame from upstream");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                if sink.is_shutting_down() {
                    return;
                }
                error!("Upstream WebSocket error: {}", e);
                sink.errored(e.to_string()).await;
                return;
            }
            None => {
                if !sink.is_shutting_down() {
                    sink.closed(Some("stream ended".to_string())).await;
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_without_api_key_fails() {
        let connector = OpenAIConnector::new(UpstreamSettings::default());
        let err = connector.open().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::ConnectionFailed {
                peer: Peer::Upstream,
                ..
            }
        ));
        assert_eq!(connector.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_send_before_open_is_rejected() {
        let connector = OpenAIConnector::new(UpstreamSettings::default());
        let event = Event::new(
            0,
            EventKind::ClientMessage(crate::core::events::ClientMessage::TurnControl(
                crate::core::events::TurnControl::CommitAudio,
            )),
        );
        assert!(matches!(
            connector.send(event),
            Err(ConnectorError::NotOpen { .. })
        ));
    }

    #[test]
    fn test_request_headers() {
        let connector = OpenAIConnector::new(UpstreamSettings {
            url: "ws://127.0.0.1:9001/v1/realtime".to_string(),
            api_key: "sk-test".to_string(),
            model: "gpt-test".to_string(),
            ..Default::default()
        });
        let request = connector.build_request().unwrap();
        assert_eq!(
            request.uri().to_string(),
            "ws://127.0.0.1:9001/v1/realtime?model=gpt-test"
        );
        assert_eq!(request.headers()["Authorization"], "Bearer sk-test");
        assert_eq!(request.headers()["OpenAI-Beta"], "realtime=v1");
        assert_eq!(request.headers()["Host"], "127.0.0.1:9001");
    }
}

//! Client connector over an accepted axum WebSocket.
//!
//! The socket is already upgraded when the gateway is built, so `open` only
//! splits it and starts the writer and reader tasks.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::codec::{decode_client_binary, decode_client_frame, encode_client_event};
use crate::core::events::{Event, Peer};
use crate::core::peer::{
    ConnectionState, Connector, ConnectorError, ConnectorResult, EventStream, InboundSink,
    PeerLink,
};

/// Grace period for flushing queued frames on close.
const CLIENT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connector to one browser or SDK client.
pub struct ClientGateway {
    socket: Mutex<Option<WebSocket>>,
    link: PeerLink,
}

impl ClientGateway {
    pub fn new(socket: WebSocket, queue_capacity: usize) -> Self {
        Self {
            socket: Mutex::new(Some(socket)),
            link: PeerLink::new(Peer::Client, queue_capacity, CLIENT_CLOSE_TIMEOUT),
        }
    }
}

#[async_trait]
impl Connector for ClientGateway {
    fn peer(&self) -> Peer {
        Peer::Client
    }

    fn state(&self) -> ConnectionState {
        self.link.state()
    }

    async fn open(&self) -> ConnectorResult<()> {
        match self.link.state() {
            ConnectionState::Open => return Ok(()),
            ConnectionState::Closing | ConnectionState::Closed => {
                return Err(ConnectorError::Closed { peer: Peer::Client });
            }
            ConnectionState::Connecting => {}
        }

        let socket = self.socket.lock().take();
        let outbound = self.link.take_outbound();
        let (Some(socket), Some(outbound)) = (socket, outbound) else {
            self.link.set_state(ConnectionState::Closed);
            return Err(ConnectorError::ConnectionFailed {
                peer: Peer::Client,
                reason: "client socket was already taken".to_string(),
            });
        };

        let (sender, receiver) = socket.split();
        self.link.set_state(ConnectionState::Open);
        self.link.attach(tokio::spawn(write_loop(sender, outbound)));
        self.link
            .attach(tokio::spawn(read_loop(receiver, self.link.inbound_sink())));

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
        // Never opened: drop the socket so the client sees the connection end.
        self.socket.lock().take();
        self.link.close().await
    }
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Event>,
) {
    while let Some(event) = outbound.recv().await {
        let json = match encode_client_event(&event) {
            Ok(json) => json,
            Err(e) => {
                error!(sequence = event.sequence(), "Failed to encode client event: {}", e);
                continue;
            }
        };
        if let Err(e) = sender.send(Message::Text(json.into())).await {
            warn!("Failed to send WebSocket message: {}", e);
            return;
        }
    }

    debug!("Client outbound queue closed, closing WebSocket");
    let _ = sender.send(Message::Close(None)).await;
    let _ = sender.close().await;
}

async fn read_loop(mut receiver: SplitStream<WebSocket>, sink: InboundSink) {
    loop {
        let message = tokio::select! {
            _ = sink.shutdown_requested() => return,
            message = receiver.next() => message,
        };

        let kind = match message {
            Some(Ok(Message::Text(text))) => match decode_client_frame(text.as_str()) {
                Ok(kind) => kind,
                Err(e) => {
                    debug!("Malformed client frame: {}", e);
                    if !sink
                        .transient(ConnectorError::MalformedFrame {
                            peer: Peer::Client,
                            reason: e.to_string(),
                        })
                        .await
                    {
                        return;
                    }
                    continue;
                }
            },
            Some(Ok(Message::Binary(data))) => decode_client_binary(data),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|f| f.reason.as_str().to_string())
                    .filter(|r| !r.is_empty());
                info!(reason = ?reason, "Client closed the WebSocket");
                sink.closed(reason).await;
                return;
            }
            Some(Err(e)) => {
                if sink.is_shutting_down() {
                    return;
                }
                warn!("Client WebSocket error: {}", e);
                sink.errored(e.to_string()).await;
                return;
            }
            None => {
                if !sink.is_shutting_down() {
                    sink.closed(None).await;
                }
                return;
            }
        };

        if !sink.event(kind).await {
            return;
        }
    }
}

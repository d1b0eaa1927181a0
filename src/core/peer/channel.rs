//! In-memory connector.
//!
//! [`ChannelConnector::pair`] returns a connector and the [`ChannelRemote`]
//! that plays the other end: it reads what the session sent and injects
//! inbound events, transient errors and closes. Used to drive sessions in
//! tests and benchmarks without sockets.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    ConnectionState, Connector, ConnectorError, ConnectorResult, EventStream, InboundSink,
    PeerLink,
};
use crate::core::events::{Event, EventKind, Peer};

const CLOSE_GRACE: Duration = Duration::from_millis(100);

/// A connector backed by in-process channels.
pub struct ChannelConnector {
    link: PeerLink,
    open_delay: Option<Duration>,
    open_failure: Option<String>,
    open_count: Mutex<u32>,
}

/// The far end of a [`ChannelConnector`].
pub struct ChannelRemote {
    peer: Peer,
    sent: mpsc::Receiver<Event>,
    inbound: InboundSink,
}

impl ChannelConnector {
    /// Create a connector and its remote end.
    pub fn pair(peer: Peer, capacity: usize) -> (Self, ChannelRemote) {
        let link = PeerLink::new(peer, capacity, CLOSE_GRACE);
        let sent = link
            .take_outbound()
            .unwrap_or_else(|| mpsc::channel(1).1);
        let inbound = link.inbound_sink();

        let connector = Self {
            link,
            open_delay: None,
            open_failure: None,
            open_count: Mutex::new(0),
        };
        let remote = ChannelRemote {
            peer,
            sent,
            inbound,
        };
        (connector, remote)
    }

    /// Delay `open` by `delay`.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Make `open` fail with `reason`.
    pub fn with_open_failure(mut self, reason: impl Into<String>) -> Self {
        self.open_failure = Some(reason.into());
        self
    }

    /// How many times `open` was called.
    pub fn open_count(&self) -> u32 {
        *self.open_count.lock()
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    fn peer(&self) -> Peer {
        self.link.peer()
    }

    fn state(&self) -> ConnectionState {
        self.link.state()
    }

    async fn open(&self) -> ConnectorResult<()> {
        *self.open_count.lock() += 1;

        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.open_failure {
            self.link.set_state(ConnectionState::Closed);
            return Err(ConnectorError::ConnectionFailed {
                peer: self.link.peer(),
                reason: reason.clone(),
            });
        }

        self.link.set_state(ConnectionState::Open);
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

impl ChannelRemote {
    pub fn peer(&self) -> Peer {
        self.peer
    }

    /// Next event the session sent to this peer. `None` once the connector
    /// closed and the queue is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.sent.recv().await
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Event> {
        tokio::time::timeout(timeout, self.sent.recv())
            .await
            .ok()
            .flatten()
    }

    /// Drain every event currently queued.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.sent.try_recv() {
            events.push(event);
        }
        events
    }

    /// Inject an inbound event as if the peer had sent it.
    pub async fn inject(&self, kind: EventKind) -> bool {
        self.inbound.event(kind).await
    }

    /// Inject an undecodable frame.
    pub async fn inject_malformed(&self, reason: impl Into<String>) -> bool {
        self.inbound
            .transient(ConnectorError::MalformedFrame {
                peer: self.peer,
                reason: reason.into(),
            })
            .await
    }

    /// The peer closes the connection.
    pub async fn close(&self, reason: Option<String>) {
        self.inbound.closed(reason).await
    }

    /// The peer's transport fails.
    pub async fn fail(&self, reason: impl Into<String>) {
        self.inbound.errored(reason).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{ClientMessage, TurnControl};
    use crate::core::peer::Received;
    use futures::StreamExt;

    fn cancel() -> EventKind {
        EventKind::ClientMessage(ClientMessage::TurnControl(TurnControl::CancelResponse))
    }

    #[tokio::test]
    async fn test_pair_round_trip() {
        let (connector, mut remote) = ChannelConnector::pair(Peer::Client, 4);
        connector.open().await.unwrap();
        assert_eq!(connector.state(), ConnectionState::Open);

        connector.send(Event::new(3, cancel())).unwrap();
        assert_eq!(remote.recv().await.unwrap().sequence(), 3);

        let mut stream = connector.receive().unwrap();
        remote.inject(cancel()).await;
        remote.close(None).await;
        assert_eq!(stream.next().await, Some(Received::Event(cancel())));
        assert_eq!(stream.next().await, Some(Received::Closed { reason: None }));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_open_failure() {
        let (connector, _remote) = ChannelConnector::pair(Peer::Upstream, 4);
        let connector = connector.with_open_failure("refused");
        let err = connector.open().await.unwrap_err();
        assert!(err.is_terminal());
        assert_eq!(connector.open_count(), 1);
    }

    #[tokio::test]
    async fn test_remote_sees_end_after_close() {
        let (connector, mut remote) = ChannelConnector::pair(Peer::Client, 4);
        connector.open().await.unwrap();
        connector.send(Event::new(1, cancel())).unwrap();
        connector.close().await.unwrap();

        assert_eq!(remote.recv().await.map(|e| e.sequence()), Some(1));
        assert!(remote.recv().await.is_none());
    }
}

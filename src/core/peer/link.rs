//! Shared connector machinery.
//!
//! [`PeerLink`] holds what every connector needs regardless of transport:
//! the bounded outbound queue, the inbound queue behind the [`EventStream`],
//! the connection state and the I/O tasks. Transports take the outbound
//! receiver and an [`InboundSink`] and run their own reader/writer tasks.
//!
//! Closing drops the outbound sender, so a writer task drains whatever is
//! still queued before it sees the end of the queue and closes the transport.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ConnectionState, ConnectorError, ConnectorResult, EventStream, Received};
use crate::core::events::{Event, EventKind, Peer};

/// Queues, state and tasks of one connection.
pub struct PeerLink {
    peer: Peer,
    state: Arc<RwLock<ConnectionState>>,
    outbound: RwLock<Option<mpsc::Sender<Event>>>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Event>>>,
    inbound_tx: mpsc::Sender<Received>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Received>>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    close_grace: Duration,
}

impl PeerLink {
    pub fn new(peer: Peer, capacity: usize, close_grace: Duration) -> Self {
        let capacity = capacity.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);

        Self {
            peer,
            state: Arc::new(RwLock::new(ConnectionState::Connecting)),
            outbound: RwLock::new(Some(outbound_tx)),
            outbound_rx: Mutex::new(Some(outbound_rx)),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            close_grace,
        }
    }

    #[inline]
    pub fn peer(&self) -> Peer {
        self.peer
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Non-blocking enqueue.
    pub fn send(&self, event: Event) -> ConnectorResult<()> {
        let sender = self.open_sender()?;
        sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(event) => ConnectorError::Backpressure {
                peer: self.peer,
                event: Box::new(event),
            },
            mpsc::error::TrySendError::Closed(_) => ConnectorError::Closed { peer: self.peer },
        })
    }

    /// Enqueue, waiting for capacity.
    pub async fn send_when_ready(&self, event: Event) -> ConnectorResult<()> {
        let sender = self.open_sender()?;
        sender
            .send(event)
            .await
            .map_err(|_| ConnectorError::Closed { peer: self.peer })
    }

    fn open_sender(&self) -> ConnectorResult<mpsc::Sender<Event>> {
        if self.state() != ConnectionState::Open {
            return Err(ConnectorError::NotOpen { peer: self.peer });
        }
        self.outbound
            .read()
            .clone()
            .ok_or(ConnectorError::Closed { peer: self.peer })
    }

    /// Take the inbound stream. Only the first call gets it.
    pub fn receive(&self) -> Option<EventStream> {
        self.inbound_rx
            .lock()
            .take()
            .map(|rx| EventStream::new(self.peer, rx))
    }

    /// Take the outbound receiver for a writer task.
    pub fn take_outbound(&self) -> Option<mpsc::Receiver<Event>> {
        self.outbound_rx.lock().take()
    }

    /// Producer side of the inbound stream for a reader task.
    pub fn inbound_sink(&self) -> InboundSink {
        InboundSink {
            peer: self.peer,
            state: self.state.clone(),
            tx: self.inbound_tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Cancelled when the link starts closing.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Track an I/O task so `close` can wait for it.
    pub fn attach(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    /// Close the link: stop accepting sends, let writers flush, then wait up
    /// to the grace period for the I/O tasks before aborting them.
    pub async fn close(&self) -> ConnectorResult<()> {
        {
            let mut state = self.state.write();
            if *state == ConnectionState::Closing {
                return Ok(());
            }
            if *state != ConnectionState::Closed {
                *state = ConnectionState::Closing;
            }
        }

        self.outbound.write().take();
        self.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for mut handle in tasks {
            if tokio::time::timeout(self.close_grace, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!(peer = %self.peer, "I/O task did not finish in time, aborting");
                handle.abort();
            }
        }

        self.set_state(ConnectionState::Closed);
        Ok(())
    }
}

/// Producer side of an [`EventStream`], handed to reader and writer tasks.
#[derive(Clone)]
pub struct InboundSink {
    peer: Peer,
    state: Arc<RwLock<ConnectionState>>,
    tx: mpsc::Sender<Received>,
    shutdown: CancellationToken,
}

impl InboundSink {
    #[inline]
    pub fn peer(&self) -> Peer {
        self.peer
    }

    /// Deliver a decoded event. Returns `false` once nobody is listening.
    pub async fn event(&self, kind: EventKind) -> bool {
        self.tx.send(Received::Event(kind)).await.is_ok()
    }

    /// Report a recoverable problem.
    pub async fn transient(&self, error: ConnectorError) -> bool {
        self.tx.send(Received::Transient(error)).await.is_ok()
    }

    /// Report a clean remote close and mark the connection closed.
    pub async fn closed(&self, reason: Option<String>) {
        self.mark_closed();
        let _ = self.tx.send(Received::Closed { reason }).await;
    }

    /// Report a transport failure and mark the connection closed.
    pub async fn errored(&self, reason: impl Into<String>) {
        self.mark_closed();
        let error = ConnectorError::Transport {
            peer: self.peer,
            reason: reason.into(),
        };
        let _ = self.tx.send(Received::Errored(error)).await;
    }

    /// Whether the link is closing locally.
    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await
    }

    fn mark_closed(&self) {
        let mut state = self.state.write();
        if *state == ConnectionState::Open || *state == ConnectionState::Connecting {
            *state = ConnectionState::Closed;
        }
    }
}

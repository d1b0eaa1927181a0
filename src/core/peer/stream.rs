//! Inbound event stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::Received;
use crate::core::events::Peer;

/// Finite stream of items received from a peer.
///
/// Always ends with exactly one terminal item (`Closed` or `Errored`). If the
/// producing task disappears without sending one, a `Closed` item is
/// synthesized.
#[derive(Debug)]
pub struct EventStream {
    peer: Peer,
    rx: mpsc::Receiver<Received>,
    finished: bool,
}

impl EventStream {
    pub fn new(peer: Peer, rx: mpsc::Receiver<Received>) -> Self {
        Self {
            peer,
            rx,
            finished: false,
        }
    }

    pub fn peer(&self) -> Peer {
        self.peer
    }

    /// Whether the terminal item has been yielded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for EventStream {
    type Item = Received;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                if item.is_terminal() {
                    self.finished = true;
                    self.rx.close();
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(Some(Received::Closed {
                    reason: Some("connection dropped".to_string()),
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

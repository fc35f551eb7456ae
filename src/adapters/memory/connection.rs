//! In-memory connection for testing.
//!
//! [`InMemoryConnection::pair`] returns the relay-side connection together
//! with an [`InMemoryPeer`] that plays the remote end. Frames the relay
//! writes are grouped by write session: everything fed between two flushes
//! arrives at the peer as one `Vec<Frame>`, which lets tests observe
//! coalescing directly.
//!
//! # Security Note
//!
//! This adapter is for **testing only** and carries no transport at all.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Sink, Stream};
use tokio::sync::mpsc;

use crate::ports::{ConnectionError, Frame};

/// Relay side of an in-memory connection.
pub struct InMemoryConnection {
    inbound: mpsc::UnboundedReceiver<Frame>,
    outbound: Option<mpsc::UnboundedSender<Vec<Frame>>>,
    session: Vec<Frame>,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
}

/// Remote end of an in-memory connection, driven by the test.
pub struct InMemoryPeer {
    to_relay: Option<mpsc::UnboundedSender<Frame>>,
    from_relay: mpsc::UnboundedReceiver<Vec<Frame>>,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
}

impl InMemoryConnection {
    /// Creates a connected relay/peer pair.
    pub fn pair() -> (InMemoryConnection, InMemoryPeer) {
        let (to_relay, inbound) = mpsc::unbounded_channel();
        let (outbound, from_relay) = mpsc::unbounded_channel();
        let fail_writes = Arc::new(AtomicBool::new(false));
        let stall_writes = Arc::new(AtomicBool::new(false));

        let connection = InMemoryConnection {
            inbound,
            outbound: Some(outbound),
            session: Vec::new(),
            fail_writes: Arc::clone(&fail_writes),
            stall_writes: Arc::clone(&stall_writes),
        };
        let peer = InMemoryPeer {
            to_relay: Some(to_relay),
            from_relay,
            fail_writes,
            stall_writes,
        };
        (connection, peer)
    }

    fn check_writable(&self) -> Result<(), ConnectionError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ConnectionError::Transport("injected write failure".to_string()));
        }
        if self.outbound.is_none() {
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }

    fn is_stalled(&self) -> bool {
        self.stall_writes.load(Ordering::SeqCst)
    }

    fn send_session(&mut self) -> Result<(), ConnectionError> {
        if self.session.is_empty() {
            return Ok(());
        }
        let frames = std::mem::take(&mut self.session);
        match &self.outbound {
            Some(tx) => tx.send(frames).map_err(|_| ConnectionError::Closed),
            None => Err(ConnectionError::Closed),
        }
    }
}

impl Stream for InMemoryConnection {
    type Item = Result<Frame, ConnectionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbound.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

impl Sink<Frame> for InMemoryConnection {
    type Error = ConnectionError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.is_stalled() {
            return Poll::Pending;
        }
        Poll::Ready(self.check_writable())
    }

    fn start_send(mut self: Pin<&mut Self>, frame: Frame) -> Result<(), Self::Error> {
        self.check_writable()?;
        self.session.push(frame);
        Ok(())
    }

    fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.is_stalled() {
            return Poll::Pending;
        }
        if let Err(e) = self.check_writable() {
            return Poll::Ready(Err(e));
        }
        Poll::Ready(self.send_session())
    }

    fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.is_stalled() {
            return Poll::Pending;
        }
        let flushed = if self.fail_writes.load(Ordering::SeqCst) {
            Ok(())
        } else {
            self.send_session()
        };
        self.outbound = None;
        Poll::Ready(flushed)
    }
}

impl InMemoryPeer {
    /// Sends a frame to the relay. Returns false once the peer is closed or
    /// the relay dropped its read half.
    pub fn send(&self, frame: Frame) -> bool {
        match &self.to_relay {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Sends a text frame to the relay.
    pub fn send_text(&self, text: &str) -> bool {
        self.send(Frame::Text(text.to_string()))
    }

    /// Answers a heartbeat.
    pub fn pong(&self) -> bool {
        self.send(Frame::Pong(b"ack".to_vec()))
    }

    /// Waits for the next write session. `None` once the relay closed its
    /// write half and every session was drained.
    pub async fn next_session(&mut self) -> Option<Vec<Frame>> {
        self.from_relay.recv().await
    }

    /// Returns a write session if one is already waiting.
    pub fn try_next_session(&mut self) -> Option<Vec<Frame>> {
        self.from_relay.try_recv().ok()
    }

    /// Drains every write session until the relay closes its write half.
    pub async fn drain_until_closed(&mut self) -> Vec<Vec<Frame>> {
        let mut sessions = Vec::new();
        while let Some(session) = self.from_relay.recv().await {
            sessions.push(session);
        }
        sessions
    }

    /// Makes every subsequent relay write fail.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent relay write hang without completing, like a
    /// peer that stopped reading from a full socket.
    pub fn stall_writes(&self) {
        self.stall_writes.store(true, Ordering::SeqCst);
    }

    /// Hangs up: the relay's read half sees the end of the stream.
    pub fn close(&mut self) {
        self.to_relay = None;
    }
}

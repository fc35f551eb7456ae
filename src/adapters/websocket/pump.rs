//! Connection pump: one read loop and one write loop per connection.
//!
//! The pump splits its connection into a read half and a write half and
//! drives each from its own task:
//!
//! - the **outbound loop** is the only writer. It drains the pump's queue
//!   (coalescing whatever is already waiting into one write session) and
//!   sends a ping every `ping_period`.
//! - the **inbound loop** is the only reader. It decodes frames, forwards
//!   them to the registry, refreshes the read deadline on every pong, and
//!   unregisters the pump when it exits.
//!
//! Neither loop is cancelled from outside. When one fails it moves the pump
//! to `Closing`; the other loop is waiting on that transition and stops too.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::{
    ping_period_for, RelayConfig, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PONG_WAIT_SECS,
    DEFAULT_WRITE_TIMEOUT_SECS,
};
use crate::domain::foundation::{PumpId, StateMachine};
use crate::domain::relay::{BroadcastMessage, InboundEnvelope, OutboundPayload, PumpState};
use crate::ports::{Connection, ConnectionError, Frame, PumpHandle, Registry, RegistryError};

/// Timing and sizing for one pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpConfig {
    /// Deadline for each write session, ping and close frame.
    pub write_wait: Duration,
    /// Read deadline, pushed forward by every pong.
    pub pong_wait: Duration,
    /// Heartbeat period. Must be shorter than `pong_wait`.
    pub ping_period: Duration,
    /// Largest inbound data frame accepted.
    pub max_message_size: usize,
    /// Outbound queue capacity.
    pub outbound_capacity: usize,
    /// Consecutive malformed frames tolerated; `None` tolerates any number.
    pub max_consecutive_decode_failures: Option<u32>,
}

impl Default for PumpConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(DEFAULT_PONG_WAIT_SECS);
        Self {
            write_wait: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            pong_wait,
            ping_period: ping_period_for(pong_wait),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            outbound_capacity: 256,
            max_consecutive_decode_failures: None,
        }
    }
}

impl From<&RelayConfig> for PumpConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            write_wait: config.write_timeout(),
            pong_wait: config.pong_wait(),
            ping_period: config.ping_period(),
            max_message_size: config.max_message_size,
            outbound_capacity: config.outbound_capacity,
            max_consecutive_decode_failures: config.max_consecutive_decode_failures,
        }
    }
}

/// A connection that has been handed to the relay but not started yet.
pub struct ConnectionPump<C: Connection> {
    id: PumpId,
    connection: C,
    outbound_tx: mpsc::Sender<OutboundPayload>,
    outbound_rx: mpsc::Receiver<OutboundPayload>,
    registry: Arc<dyn Registry>,
    config: PumpConfig,
}

impl<C: Connection> ConnectionPump<C> {
    /// Wraps a ready connection and gives it a fresh id.
    pub fn new(connection: C, registry: Arc<dyn Registry>, config: PumpConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        Self {
            id: PumpId::new(),
            connection,
            outbound_tx,
            outbound_rx,
            registry,
            config,
        }
    }

    pub fn id(&self) -> &PumpId {
        &self.id
    }

    /// Registers the pump, then spawns its two loops.
    ///
    /// The queue sender moves into the registry: from here on the registry
    /// is the only producer, and dropping its handle is what closes the
    /// queue. If registration fails the connection is dropped unused.
    pub async fn start(self) -> Result<RunningPump, RegistryError> {
        let ConnectionPump {
            id,
            connection,
            outbound_tx,
            outbound_rx,
            registry,
            config,
        } = self;

        let lifecycle = Lifecycle::new(id);

        if let Err(e) = registry.register(PumpHandle::new(id, outbound_tx)).await {
            tracing::warn!(pump_id = %id, "Registration failed: {}", e);
            lifecycle.advance(PumpState::Terminated);
            return Err(e);
        }
        lifecycle.advance(PumpState::Registered);

        let (sink, stream) = connection.split();

        let outbound = OutboundLoop {
            id,
            sink,
            queue: outbound_rx,
            lifecycle: lifecycle.clone(),
            write_wait: config.write_wait,
            ping_period: config.ping_period,
        };
        let inbound = InboundLoop {
            id,
            stream,
            registry,
            lifecycle: lifecycle.clone(),
            pong_wait: config.pong_wait,
            max_message_size: config.max_message_size,
            decode_failure_budget: config.max_consecutive_decode_failures,
        };

        lifecycle.advance(PumpState::Active);
        tracing::debug!(pump_id = %id, "Pump started");

        Ok(RunningPump {
            id,
            state: lifecycle.subscribe(),
            outbound: tokio::spawn(outbound.run()),
            inbound: tokio::spawn(inbound.run()),
        })
    }
}

/// Handle to a pump whose loops are running.
pub struct RunningPump {
    id: PumpId,
    state: watch::Receiver<PumpState>,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl RunningPump {
    pub fn id(&self) -> &PumpId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PumpState {
        *self.state.borrow()
    }

    /// Waits until the pump reaches `Terminated`.
    pub async fn terminated(&mut self) {
        // The sender lives as long as either loop; if both are gone the
        // pump is terminated anyway.
        let _ = self
            .state
            .wait_for(|state| *state == PumpState::Terminated)
            .await;
    }

    /// Waits for both loops to finish.
    pub async fn join(self) -> Result<(), JoinError> {
        let (inbound, outbound) = tokio::join!(self.inbound, self.outbound);
        inbound?;
        outbound?;
        Ok(())
    }
}

// ============================================
// Lifecycle shared by both loops
// ============================================

/// Pump state plus a count of loops still running.
///
/// The state doubles as the "connection closed" signal: each loop waits for
/// `Closing` alongside its own blocking operation.
#[derive(Clone)]
struct Lifecycle {
    id: PumpId,
    state: Arc<watch::Sender<PumpState>>,
    running_loops: Arc<AtomicUsize>,
}

impl Lifecycle {
    fn new(id: PumpId) -> Self {
        let (state, _) = watch::channel(PumpState::Created);
        Self {
            id,
            state: Arc::new(state),
            running_loops: Arc::new(AtomicUsize::new(2)),
        }
    }

    fn subscribe(&self) -> watch::Receiver<PumpState> {
        self.state.subscribe()
    }

    /// Applies a transition if it is valid from the current state.
    fn advance(&self, next: PumpState) -> bool {
        let id = self.id;
        self.state.send_if_modified(|state| match state.transition_to(next) {
            Ok(next) => {
                tracing::trace!(pump_id = %id, from = %state, to = %next, "Pump state changed");
                *state = next;
                true
            }
            Err(_) => false,
        })
    }

    /// Moves to `Closing` unless already there.
    fn begin_closing(&self) {
        self.advance(PumpState::Closing);
    }

    /// Resolves once either loop has started closing the connection.
    async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| matches!(state, PumpState::Closing | PumpState::Terminated))
            .await;
    }

    /// Called once by each loop on exit; the last one terminates the pump.
    fn loop_finished(&self) {
        if self.running_loops.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.advance(PumpState::Terminated);
            tracing::debug!(pump_id = %self.id, "Pump terminated");
        }
    }
}

// ============================================
// Outbound loop
// ============================================

enum OutboundExit {
    QueueClosed,
    ConnectionClosed,
    Failed(ConnectionError),
}

struct OutboundLoop<C: Connection> {
    id: PumpId,
    sink: SplitSink<C, Frame>,
    queue: mpsc::Receiver<OutboundPayload>,
    lifecycle: Lifecycle,
    write_wait: Duration,
    ping_period: Duration,
}

impl<C: Connection> OutboundLoop<C> {
    async fn run(mut self) {
        let exit = self.pump().await;
        let deadline = Instant::now() + self.write_wait;

        match &exit {
            OutboundExit::QueueClosed => {
                tracing::debug!(pump_id = %self.id, "Outbound queue closed, sending close frame");
                if let Err(e) = self.write(deadline, Frame::Close, true).await {
                    tracing::debug!(pump_id = %self.id, "Close frame not delivered: {}", e);
                }
            }
            OutboundExit::ConnectionClosed => {
                tracing::debug!(pump_id = %self.id, "Connection closed by read side");
            }
            OutboundExit::Failed(e) => {
                tracing::debug!(pump_id = %self.id, "Write failed, closing connection: {}", e);
            }
        }

        self.lifecycle.begin_closing();
        // A sink that already missed its deadline gets no second one.
        if !matches!(exit, OutboundExit::Failed(ConnectionError::WriteTimeout)) {
            if let Ok(Err(e)) = time::timeout_at(deadline, self.sink.close()).await {
                tracing::trace!(pump_id = %self.id, "Error closing write half: {}", e);
            }
        }
        self.lifecycle.loop_finished();
    }

    async fn pump(&mut self) -> OutboundExit {
        let mut heartbeat = time::interval_at(Instant::now() + self.ping_period, self.ping_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let lifecycle = self.lifecycle.clone();

        loop {
            let result = tokio::select! {
                payload = self.queue.recv() => match payload {
                    Some(payload) => self.write_session(payload).await,
                    None => return OutboundExit::QueueClosed,
                },
                _ = heartbeat.tick() => {
                    let deadline = Instant::now() + self.write_wait;
                    self.write(deadline, Frame::Ping(Vec::new()), true).await
                }
                _ = lifecycle.closed() => return OutboundExit::ConnectionClosed,
            };

            if let Err(e) = result {
                return OutboundExit::Failed(e);
            }
        }
    }

    /// Writes `first` and every payload already queued behind it as one
    /// write session, in queue order.
    async fn write_session(&mut self, first: OutboundPayload) -> Result<(), ConnectionError> {
        let deadline = Instant::now() + self.write_wait;
        self.write(deadline, Frame::Text(first.into_string()), false)
            .await?;

        let waiting = self.queue.len();
        let mut coalesced = 0;
        for _ in 0..waiting {
            match self.queue.try_recv() {
                Ok(payload) => {
                    self.write(deadline, Frame::Text(payload.into_string()), false)
                        .await?;
                    coalesced += 1;
                }
                Err(_) => break,
            }
        }

        self.flush(deadline).await?;
        if coalesced > 0 {
            tracing::trace!(pump_id = %self.id, frames = coalesced + 1, "Coalesced write session");
        }
        Ok(())
    }

    async fn write(
        &mut self,
        deadline: Instant,
        frame: Frame,
        flush: bool,
    ) -> Result<(), ConnectionError> {
        let write = async {
            self.sink.feed(frame).await?;
            if flush {
                self.sink.flush().await?;
            }
            Ok::<(), ConnectionError>(())
        };
        time::timeout_at(deadline, write)
            .await
            .map_err(|_| ConnectionError::WriteTimeout)?
    }

    async fn flush(&mut self, deadline: Instant) -> Result<(), ConnectionError> {
        time::timeout_at(deadline, self.sink.flush())
            .await
            .map_err(|_| ConnectionError::WriteTimeout)?
    }
}

// ============================================
// Inbound loop
// ============================================

enum InboundExit {
    Connection(ConnectionError),
    TooManyDecodeFailures(u32),
    RegistryGone,
}

struct InboundLoop<C: Connection> {
    id: PumpId,
    stream: SplitStream<C>,
    registry: Arc<dyn Registry>,
    lifecycle: Lifecycle,
    pong_wait: Duration,
    max_message_size: usize,
    decode_failure_budget: Option<u32>,
}

impl<C: Connection> InboundLoop<C> {
    async fn run(mut self) {
        let exit = self.pump().await;

        match &exit {
            InboundExit::Connection(ConnectionError::Closed) => {
                tracing::debug!(pump_id = %self.id, "Peer disconnected");
            }
            InboundExit::Connection(ConnectionError::ReadTimeout) => {
                tracing::debug!(pump_id = %self.id, "No pong within read deadline");
            }
            InboundExit::Connection(e) => {
                tracing::warn!(pump_id = %self.id, "Read failed, closing connection: {}", e);
            }
            InboundExit::TooManyDecodeFailures(n) => {
                tracing::warn!(pump_id = %self.id, failures = n, "Too many malformed messages, closing connection");
            }
            InboundExit::RegistryGone => {
                tracing::warn!(pump_id = %self.id, "Registry stopped, closing connection");
            }
        }

        self.lifecycle.begin_closing();
        if let Err(e) = self.registry.unregister(&self.id).await {
            tracing::debug!(pump_id = %self.id, "Unregister not delivered: {}", e);
        }
        self.lifecycle.loop_finished();
    }

    async fn pump(&mut self) -> InboundExit {
        let mut read_deadline = Instant::now() + self.pong_wait;
        let mut decode_failures = DecodeFailures::new(self.decode_failure_budget);

        loop {
            let frame = match self.read(read_deadline).await {
                Ok(frame) => frame,
                Err(e) => return InboundExit::Connection(e),
            };

            let Some(body) = frame.data() else {
                match frame {
                    Frame::Pong(_) => read_deadline = Instant::now() + self.pong_wait,
                    Frame::Close => return InboundExit::Connection(ConnectionError::Closed),
                    // Pings are answered by the transport.
                    _ => {}
                }
                continue;
            };

            if body.len() > self.max_message_size {
                return InboundExit::Connection(ConnectionError::FrameTooLarge {
                    size: body.len(),
                    limit: self.max_message_size,
                });
            }

            let envelope = match InboundEnvelope::decode(body) {
                Ok(envelope) => {
                    decode_failures.reset();
                    envelope
                }
                Err(e) => {
                    tracing::warn!(pump_id = %self.id, "Dropping malformed message: {}", e);
                    if decode_failures.record() {
                        return InboundExit::TooManyDecodeFailures(decode_failures.consecutive);
                    }
                    continue;
                }
            };

            let message = BroadcastMessage::from_envelope(self.id, envelope);
            if self.registry.broadcast(message).await.is_err() {
                return InboundExit::RegistryGone;
            }
        }
    }

    /// Reads one frame, failing at the deadline or when the write side has
    /// closed the connection.
    async fn read(&mut self, deadline: Instant) -> Result<Frame, ConnectionError> {
        let lifecycle = self.lifecycle.clone();
        tokio::select! {
            read = time::timeout_at(deadline, self.stream.next()) => match read {
                Err(_) => Err(ConnectionError::ReadTimeout),
                Ok(None) => Err(ConnectionError::Closed),
                Ok(Some(frame)) => frame,
            },
            _ = lifecycle.closed() => Err(ConnectionError::Closed),
        }
    }
}

/// Consecutive decode failures, checked against an optional limit.
#[derive(Debug)]
struct DecodeFailures {
    consecutive: u32,
    limit: Option<u32>,
}

impl DecodeFailures {
    fn new(limit: Option<u32>) -> Self {
        Self {
            consecutive: 0,
            limit,
        }
    }

    fn reset(&mut self) {
        self.consecutive = 0;
    }

    /// Records one failure. Returns true once the limit is reached.
    fn record(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.limit.is_some_and(|limit| self.consecutive >= limit)
    }
}

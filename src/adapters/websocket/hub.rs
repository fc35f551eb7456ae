//! Hub: the relay's registry, run as a single-task actor.
//!
//! The hub owns the live pump set outright. Pumps and handlers talk to it
//! only through [`HubHandle`], whose methods push onto bounded channels; the
//! hub task takes one signal at a time, so membership changes and fan-out
//! never interleave.
//!
//! # Fan-out
//!
//! ```text
//! pump A ──broadcast──►┌──────┐──try_send──► queue B ──► pump B
//!                      │ Hub  │──try_send──► queue C ──► pump C
//! pump B ──unregister─►└──────┘    (A only with EchoPolicy::IncludeSender)
//! ```
//!
//! A pump whose queue is full at fan-out time is evicted: its sender is
//! dropped, which closes its queue and makes the pump shut its connection.
//!
//! Pumps hold a [`WeakHubHandle`]. Only the server's [`HubHandle`]s keep the
//! hub alive; once they are gone the hub stops and closes every queue.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;

use crate::config::RelayConfig;
use crate::domain::foundation::PumpId;
use crate::domain::relay::{BroadcastMessage, EchoPolicy};
use crate::ports::{PumpHandle, Registry, RegistryError};

/// Capacity of the register and unregister channels.
const SIGNAL_CAPACITY: usize = 64;

/// Hub settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    pub echo_policy: EchoPolicy,
    pub broadcast_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for HubConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            echo_policy: config.echo_policy,
            broadcast_capacity: config.broadcast_capacity,
        }
    }
}

/// The registry actor. Create with [`Hub::new`] and drive with [`Hub::run`].
pub struct Hub {
    pumps: HashMap<PumpId, PumpHandle>,
    echo_policy: EchoPolicy,
    register_rx: mpsc::Receiver<PumpHandle>,
    unregister_rx: mpsc::Receiver<PumpId>,
    broadcast_rx: mpsc::Receiver<BroadcastMessage>,
    count_rx: mpsc::Receiver<oneshot::Sender<usize>>,
}

/// Cloneable signaling handle to a running [`Hub`].
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<PumpHandle>,
    unregister_tx: mpsc::Sender<PumpId>,
    broadcast_tx: mpsc::Sender<BroadcastMessage>,
    count_tx: mpsc::Sender<oneshot::Sender<usize>>,
}

/// Non-owning handle given to pumps. Signals fail with
/// [`RegistryError::Closed`] once every [`HubHandle`] is dropped.
#[derive(Clone)]
pub struct WeakHubHandle {
    register_tx: mpsc::WeakSender<PumpHandle>,
    unregister_tx: mpsc::WeakSender<PumpId>,
    broadcast_tx: mpsc::WeakSender<BroadcastMessage>,
}

impl Hub {
    /// Creates a hub and the handle used to signal it.
    pub fn new(config: HubConfig) -> (Hub, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_capacity.max(1));
        let (count_tx, count_rx) = mpsc::channel(SIGNAL_CAPACITY);

        let hub = Hub {
            pumps: HashMap::new(),
            echo_policy: config.echo_policy,
            register_rx,
            unregister_rx,
            broadcast_rx,
            count_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            count_tx,
        };
        (hub, handle)
    }

    /// Creates a hub and spawns it on the current runtime.
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (hub, handle) = Hub::new(config);
        tokio::spawn(hub.run());
        handle
    }

    /// Processes signals until every [`HubHandle`] is dropped.
    ///
    /// Membership changes are taken before broadcasts, so a pump whose
    /// registration was sent before a message is always in the set when that
    /// message fans out.
    pub async fn run(mut self) {
        tracing::debug!("Hub started");
        loop {
            tokio::select! {
                biased;
                Some(pump) = self.register_rx.recv() => self.register(pump),
                Some(id) = self.unregister_rx.recv() => self.unregister(&id),
                Some(message) = self.broadcast_rx.recv() => self.fan_out(message),
                Some(reply) = self.count_rx.recv() => {
                    let _ = reply.send(self.pumps.len());
                }
                else => break,
            }
        }

        let remaining = self.pumps.len();
        self.pumps.clear();
        tracing::debug!(remaining, "Hub stopped");
    }

    fn register(&mut self, pump: PumpHandle) {
        let id = *pump.id();
        self.pumps.insert(id, pump);
        tracing::info!(pump_id = %id, peers = self.pumps.len(), "Peer connected");
    }

    fn unregister(&mut self, id: &PumpId) {
        if self.pumps.remove(id).is_some() {
            tracing::info!(pump_id = %id, peers = self.pumps.len(), "Peer disconnected");
        }
    }

    fn fan_out(&mut self, message: BroadcastMessage) {
        let payload = match message.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(pump_id = %message.sender_id(), "Failed to serialize message: {}", e);
                return;
            }
        };

        let mut evicted = Vec::new();
        for (id, pump) in &self.pumps {
            if !self.echo_policy.delivers_to(message.sender_id(), id) {
                continue;
            }
            match pump.outbound().try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(pump_id = %id, "Outbound queue full, dropping slow peer");
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => evicted.push(*id),
            }
        }

        for id in evicted {
            self.unregister(&id);
        }
    }
}

impl HubHandle {
    /// Returns a handle that does not keep the hub running.
    pub fn downgrade(&self) -> WeakHubHandle {
        WeakHubHandle {
            register_tx: self.register_tx.downgrade(),
            unregister_tx: self.unregister_tx.downgrade(),
            broadcast_tx: self.broadcast_tx.downgrade(),
        }
    }

    /// Number of pumps currently registered.
    pub async fn connected_count(&self) -> Result<usize, RegistryError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.count_tx
            .send(reply_tx)
            .await
            .map_err(|_| RegistryError::Closed)?;
        reply_rx.await.map_err(|_| RegistryError::Closed)
    }
}

#[async_trait]
impl Registry for HubHandle {
    async fn register(&self, pump: PumpHandle) -> Result<(), RegistryError> {
        self.register_tx
            .send(pump)
            .await
            .map_err(|_| RegistryError::Closed)
    }

    async fn unregister(&self, id: &PumpId) -> Result<(), RegistryError> {
        self.unregister_tx
            .send(*id)
            .await
            .map_err(|_| RegistryError::Closed)
    }

    async fn broadcast(&self, message: BroadcastMessage) -> Result<(), RegistryError> {
        self.broadcast_tx
            .send(message)
            .await
            .map_err(|_| RegistryError::Closed)
    }
}

#[async_trait]
impl Registry for WeakHubHandle {
    async fn register(&self, pump: PumpHandle) -> Result<(), RegistryError> {
        let tx = self.register_tx.upgrade().ok_or(RegistryError::Closed)?;
        tx.send(pump).await.map_err(|_| RegistryError::Closed)
    }

    async fn unregister(&self, id: &PumpId) -> Result<(), RegistryError> {
        let tx = self.unregister_tx.upgrade().ok_or(RegistryError::Closed)?;
        tx.send(*id).await.map_err(|_| RegistryError::Closed)
    }

    async fn broadcast(&self, message: BroadcastMessage) -> Result<(), RegistryError> {
        let tx = self.broadcast_tx.upgrade().ok_or(RegistryError::Closed)?;
        tx.send(message).await.map_err(|_| RegistryError::Closed)
    }
}

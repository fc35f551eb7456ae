//! Registry port - the serialized coordinator of live pumps.
//!
//! Pumps never touch the live set directly. They signal the registry through
//! three one-way operations:
//!
//! 1. `register` once, before the pump's loops start
//! 2. `broadcast` for every message the pump's inbound loop decodes
//! 3. `unregister` once, when the pump's inbound loop exits
//!
//! Unregistering releases the pump's outbound queue sender. The pump's
//! outbound loop sees the queue close and shuts the connection down.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::foundation::PumpId;
use crate::domain::relay::{BroadcastMessage, OutboundPayload};

/// What the registry keeps for one live pump.
#[derive(Debug, Clone)]
pub struct PumpHandle {
    id: PumpId,
    outbound: mpsc::Sender<OutboundPayload>,
}

impl PumpHandle {
    pub fn new(id: PumpId, outbound: mpsc::Sender<OutboundPayload>) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> &PumpId {
        &self.id
    }

    /// Sender side of the pump's outbound queue.
    pub fn outbound(&self) -> &mpsc::Sender<OutboundPayload> {
        &self.outbound
    }
}

/// Errors returned by registry signaling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry stopped and no longer accepts signals.
    #[error("registry is no longer running")]
    Closed,
}

/// Port for the coordinator that owns the set of live pumps.
///
/// Implementations must serialize all mutation of the live set so that a
/// broadcast never races a registration or removal.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Add a pump to the live set.
    async fn register(&self, pump: PumpHandle) -> Result<(), RegistryError>;

    /// Remove a pump from the live set and release its outbound queue.
    ///
    /// Unknown ids are ignored.
    async fn unregister(&self, id: &PumpId) -> Result<(), RegistryError>;

    /// Deliver a message to the live pumps.
    ///
    /// May wait while the registry applies backpressure.
    async fn broadcast(&self, message: BroadcastMessage) -> Result<(), RegistryError>;
}

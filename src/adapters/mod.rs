//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the relay to the outside world:
//! - `websocket` - axum WebSocket transport, connection pumps and the hub
//! - `memory` - In-memory connection for tests

pub mod memory;
pub mod websocket;

pub use memory::{InMemoryConnection, InMemoryPeer};
pub use websocket::{ConnectionPump, Hub, HubConfig, HubHandle, PumpConfig, RunningPump};

//! Ports - Interfaces for external collaborators.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the relay core and the outside world. Adapters implement these ports.
//!
//! - `Connection` - A ready duplex frame channel produced by an upgrade step
//! - `Registry` - The serialized coordinator that owns the live pump set

mod connection;
mod registry;

pub use connection::{Connection, ConnectionError, Frame};
pub use registry::{PumpHandle, Registry, RegistryError};

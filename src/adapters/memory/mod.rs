//! In-memory adapters used by tests and local experiments.

mod connection;

pub use connection::{InMemoryConnection, InMemoryPeer};

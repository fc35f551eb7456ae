//! Chat Relay - WebSocket broadcast relay
//!
//! Every connected peer gets a connection pump: one task reads frames,
//! decodes chat messages and forwards them to the hub, another drains the
//! peer's outbound queue onto the socket and keeps the link alive with
//! heartbeats. The hub fans every message out to all other peers.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;

//! WebSocket adapters for the chat relay.
//!
//! # Architecture
//!
//! ```text
//!   client A ─┐                                   ┌─ client B
//!             │ frames                     frames │
//!             ▼                                   ▲
//! ┌──────────────────────┐            ┌──────────────────────┐
//! │ ConnectionPump (A)   │            │ ConnectionPump (B)   │
//! │  InboundLoop ────────┼─broadcast─►│                      │
//! │                      │     │      │  OutboundLoop ◄──────┼─ queue B
//! └──────────────────────┘     ▼      └──────────────────────┘     ▲
//!                         ┌─────────┐                              │
//!                         │   Hub   │───────────try_send───────────┘
//!                         └─────────┘
//! ```
//!
//! # Components
//!
//! - [`pump`] - Per-connection read and write loops
//! - [`hub`] - Registry actor owning the live pump set
//! - [`connection`] - axum WebSocket as a relay connection
//! - [`handler`] - Axum upgrade and health handlers

pub mod connection;
pub mod handler;
pub mod hub;
pub mod pump;

pub use connection::WsConnection;
pub use handler::{health, relay_router, ws_handler, HealthResponse, WebSocketState};
pub use hub::{Hub, HubConfig, HubHandle, WeakHubHandle};
pub use pump::{ConnectionPump, PumpConfig, RunningPump};

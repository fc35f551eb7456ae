//! Relay domain - messages exchanged between pumps and the registry, the
//! fan-out echo policy, and the pump lifecycle.

mod echo_policy;
mod messages;
mod pump_state;

pub use echo_policy::EchoPolicy;
pub use messages::{BroadcastMessage, InboundEnvelope, OutboundPayload};
pub use pump_state::PumpState;

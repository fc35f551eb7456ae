//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, the state machine trait and error types that the
//! relay domain is built from.

mod errors;
mod ids;
mod state_machine;

pub use errors::ValidationError;
pub use ids::PumpId;
pub use state_machine::StateMachine;

//! Domain layer containing the relay's value types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (identifiers, state machine trait, errors)
//! - `relay` - Relay messages and the connection pump lifecycle

pub mod foundation;
pub mod relay;

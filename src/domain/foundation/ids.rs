//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for one connection pump.
///
/// Generated server-side when a connection is handed to a pump and kept for
/// the lifetime of that connection. Serialized as an opaque string; callers
/// must not rely on its format or ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PumpId(Uuid);

impl PumpId {
    /// Creates a new random PumpId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PumpId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PumpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PumpId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

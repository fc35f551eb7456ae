//! Connection pump lifecycle.

use serde::Serialize;

use crate::domain::foundation::StateMachine;

/// Lifecycle of one connection pump.
///
/// ```text
/// Created ──► Registered ──► Active ──► Closing ──► Terminated
///    │             │                       ▲
///    │             └───────────────────────┘
///    └──────────────────────────────────────────────► Terminated
/// ```
///
/// `Created → Terminated` is taken only when registration itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpState {
    /// Connection handed over, not yet known to the registry.
    Created,
    /// Registered; loops not started yet.
    Registered,
    /// Both loops running.
    Active,
    /// One of the loops failed or the queue was closed; teardown in progress.
    Closing,
    /// Connection closed and, from the inbound side, unregistered.
    Terminated,
}

impl StateMachine for PumpState {
    fn valid_transitions(&self) -> Vec<Self> {
        use PumpState::*;
        match self {
            Created => vec![Registered, Terminated],
            Registered => vec![Active, Closing],
            Active => vec![Closing],
            Closing => vec![Terminated],
            Terminated => vec![],
        }
    }
}

impl std::fmt::Display for PumpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PumpState::Created => "created",
            PumpState::Registered => "registered",
            PumpState::Active => "active",
            PumpState::Closing => "closing",
            PumpState::Terminated => "terminated",
        };
        write!(f, "{}", s)
    }
}

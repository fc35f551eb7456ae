//! Self-echo policy for fan-out.

use serde::Deserialize;

use crate::domain::foundation::PumpId;

/// Whether a sender receives its own broadcast back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoPolicy {
    /// Everyone but the sender receives the message.
    #[default]
    ExcludeSender,
    /// Every live pump, the sender included, receives the message.
    IncludeSender,
}

impl EchoPolicy {
    /// Returns true if `target` should receive a message sent by `sender`.
    pub fn delivers_to(&self, sender: &PumpId, target: &PumpId) -> bool {
        match self {
            EchoPolicy::ExcludeSender => sender != target,
            EchoPolicy::IncludeSender => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_excludes_sender() {
        let me = PumpId::new();
        let other = PumpId::new();
        let policy = EchoPolicy::default();

        assert!(!policy.delivers_to(&me, &me));
        assert!(policy.delivers_to(&me, &other));
    }

    #[test]
    fn include_sender_delivers_to_everyone() {
        let me = PumpId::new();
        assert!(EchoPolicy::IncludeSender.delivers_to(&me, &me));
    }

    #[test]
    fn deserializes_from_snake_case() {
        let policy: EchoPolicy = serde_json::from_str("\"include_sender\"").unwrap();
        assert_eq!(policy, EchoPolicy::IncludeSender);
    }
}

//! Relay message types.
//!
//! - Peer → Relay: [`InboundEnvelope`], the JSON body of one inbound frame
//! - Pump → Registry: [`BroadcastMessage`], an attributed message to fan out
//! - Registry → Pump: [`OutboundPayload`], the bytes of one outbound frame

use serde::{Deserialize, Serialize};

use crate::domain::foundation::PumpId;

// ============================================
// Peer → Relay
// ============================================

/// Decoded body of one inbound frame.
///
/// Only `text` is required; any other field the peer sends is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundEnvelope {
    pub text: String,
}

impl InboundEnvelope {
    /// Decodes a frame body.
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

// ============================================
// Pump → Registry
// ============================================

/// A message read from one peer, attributed to the pump that read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    sender_id: PumpId,
    text: String,
}

impl BroadcastMessage {
    pub fn new(sender_id: PumpId, text: impl Into<String>) -> Self {
        Self {
            sender_id,
            text: text.into(),
        }
    }

    /// Builds the message a pump forwards after decoding an inbound frame.
    pub fn from_envelope(sender_id: PumpId, envelope: InboundEnvelope) -> Self {
        Self::new(sender_id, envelope.text)
    }

    pub fn sender_id(&self) -> &PumpId {
        &self.sender_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Serializes the message into the payload written to receiving peers.
    pub fn to_payload(&self) -> Result<OutboundPayload, serde_json::Error> {
        serde_json::to_string(self).map(OutboundPayload)
    }
}

// ============================================
// Registry → Pump
// ============================================

/// Body of one outbound frame, queued on a pump by the registry.
///
/// The pump writes it verbatim and never inspects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPayload(String);

impl OutboundPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for OutboundPayload {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OutboundPayload {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_decodes_text_field() {
        let envelope = InboundEnvelope::decode(br#"{"text":"hi"}"#).unwrap();
        assert_eq!(envelope.text, "hi");
    }

    #[test]
    fn envelope_ignores_extra_fields() {
        let envelope =
            InboundEnvelope::decode(br#"{"text":"hi","room":"lobby","n":3}"#).unwrap();
        assert_eq!(envelope.text, "hi");
    }

    #[test]
    fn envelope_rejects_missing_text() {
        assert!(InboundEnvelope::decode(br#"{"body":"hi"}"#).is_err());
    }

    #[test]
    fn envelope_rejects_non_string_text() {
        assert!(InboundEnvelope::decode(br#"{"text":42}"#).is_err());
    }

    #[test]
    fn envelope_rejects_non_json() {
        assert!(InboundEnvelope::decode(b"hello there").is_err());
    }

    #[test]
    fn broadcast_message_carries_sender() {
        let sender = PumpId::new();
        let envelope = InboundEnvelope {
            text: "hello".to_string(),
        };
        let msg = BroadcastMessage::from_envelope(sender, envelope);
        assert_eq!(msg.sender_id(), &sender);
        assert_eq!(msg.text(), "hello");
    }

    #[test]
    fn payload_is_camel_case_json() {
        let sender = PumpId::new();
        let payload = BroadcastMessage::new(sender, "hi").to_payload().unwrap();
        let value: serde_json::Value = serde_json::from_str(payload.as_str()).unwrap();
        assert_eq!(value["senderId"], sender.to_string());
        assert_eq!(value["text"], "hi");
    }
}

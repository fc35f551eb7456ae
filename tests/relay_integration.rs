//! Integration tests for the relay core.
//!
//! These tests wire real connection pumps to a running hub over in-memory
//! connections and verify:
//! 1. Messages fan out to every other peer, attributed to their sender
//! 2. Malformed frames are skipped without tearing the connection down
//! 3. A hangup unregisters the peer exactly once
//! 4. Concurrent senders never interleave or reorder one peer's writes

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Value;

use chat_relay::adapters::websocket::{
    ConnectionPump, Hub, HubConfig, HubHandle, PumpConfig, RunningPump,
};
use chat_relay::adapters::{InMemoryConnection, InMemoryPeer};
use chat_relay::domain::foundation::PumpId;
use chat_relay::domain::relay::{BroadcastMessage, EchoPolicy, PumpState};
use chat_relay::ports::{Frame, Registry};

// =============================================================================
// Test Infrastructure
// =============================================================================

fn hub(echo_policy: EchoPolicy) -> HubHandle {
    Hub::spawn(HubConfig {
        echo_policy,
        ..Default::default()
    })
}

async fn connect(hub: &HubHandle) -> (InMemoryPeer, RunningPump) {
    let (connection, peer) = InMemoryConnection::pair();
    let registry: Arc<dyn Registry> = Arc::new(hub.downgrade());
    let pump = ConnectionPump::new(connection, registry, PumpConfig::default())
        .start()
        .await
        .unwrap();
    (peer, pump)
}

/// Decodes every text frame of a write session.
fn payloads(session: Vec<Frame>) -> Vec<Value> {
    session
        .into_iter()
        .filter_map(|frame| match frame {
            Frame::Text(text) => Some(serde_json::from_str(&text).unwrap()),
            _ => None,
        })
        .collect()
}

/// Reads sessions until at least `count` payloads arrived.
async fn receive(peer: &mut InMemoryPeer, count: usize) -> Vec<Value> {
    let mut received = Vec::new();
    while received.len() < count {
        let session = peer.next_session().await.expect("relay closed the connection");
        received.extend(payloads(session));
    }
    received
}

fn is_from(payload: &Value, sender: &PumpId, text: &str) -> bool {
    payload["senderId"] == sender.to_string() && payload["text"] == text
}

// =============================================================================
// Fan-out
// =============================================================================

#[tokio::test]
async fn message_reaches_every_other_peer() {
    let hub = hub(EchoPolicy::ExcludeSender);
    let (mut a, pump_a) = connect(&hub).await;
    let (mut b, pump_b) = connect(&hub).await;
    let (mut c, _pump_c) = connect(&hub).await;

    assert!(a.send_text(r#"{"text":"hi"}"#));

    let at_b = receive(&mut b, 1).await;
    let at_c = receive(&mut c, 1).await;
    assert!(is_from(&at_b[0], pump_a.id(), "hi"));
    assert!(is_from(&at_c[0], pump_a.id(), "hi"));

    // B's reply is the first thing A ever receives: A never saw its own message.
    assert!(b.send_text(r#"{"text":"hey"}"#));
    let at_a = receive(&mut a, 1).await;
    assert!(is_from(&at_a[0], pump_b.id(), "hey"));
}

#[tokio::test]
async fn include_sender_echoes_back() {
    let hub = hub(EchoPolicy::IncludeSender);
    let (mut a, pump_a) = connect(&hub).await;
    let (mut b, _pump_b) = connect(&hub).await;

    assert!(a.send_text(r#"{"text":"echo"}"#));

    assert!(is_from(&receive(&mut a, 1).await[0], pump_a.id(), "echo"));
    assert!(is_from(&receive(&mut b, 1).await[0], pump_a.id(), "echo"));
}

#[tokio::test]
async fn malformed_frame_is_skipped_and_next_one_delivered() {
    let hub = hub(EchoPolicy::ExcludeSender);
    let (a, pump_a) = connect(&hub).await;
    let (mut b, _pump_b) = connect(&hub).await;

    assert!(a.send_text("not json"));
    assert!(a.send_text(r#"{"text":"ok"}"#));

    let at_b = receive(&mut b, 1).await;
    assert_eq!(at_b.len(), 1);
    assert!(is_from(&at_b[0], pump_a.id(), "ok"));
    assert_eq!(pump_a.state(), PumpState::Active);
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn hangup_unregisters_and_terminates() {
    let hub = hub(EchoPolicy::ExcludeSender);
    let (mut a, mut pump_a) = connect(&hub).await;
    let (mut b, _pump_b) = connect(&hub).await;
    assert_eq!(hub.connected_count().await.unwrap(), 2);

    a.close();
    pump_a.terminated().await;

    assert_eq!(pump_a.state(), PumpState::Terminated);
    assert_eq!(hub.connected_count().await.unwrap(), 1);

    // The survivor still relays and the departed peer gets nothing more.
    hub.broadcast(BroadcastMessage::new(PumpId::new(), "after"))
        .await
        .unwrap();
    assert_eq!(receive(&mut b, 1).await[0]["text"], "after");
    let leftovers: Vec<Value> = a
        .drain_until_closed()
        .await
        .into_iter()
        .flat_map(payloads)
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn write_failure_removes_peer_from_hub() {
    let hub = hub(EchoPolicy::ExcludeSender);
    let (a, mut pump_a) = connect(&hub).await;
    let (b, _pump_b) = connect(&hub).await;

    a.fail_writes();
    assert!(b.send_text(r#"{"text":"boom"}"#));
    pump_a.terminated().await;

    assert_eq!(hub.connected_count().await.unwrap(), 1);
}

#[tokio::test]
async fn hub_shutdown_closes_live_pumps() {
    let (hub, handle) = Hub::new(HubConfig::default());
    let hub_task = tokio::spawn(hub.run());
    let (mut a, mut pump_a) = connect(&handle).await;

    // Pumps only hold weak handles, so dropping the server's handle stops the hub.
    drop(handle);
    hub_task.await.unwrap();
    pump_a.terminated().await;

    assert_eq!(pump_a.state(), PumpState::Terminated);
    assert_eq!(a.drain_until_closed().await, vec![vec![Frame::Close]]);
}

#[tokio::test]
async fn pump_fails_to_start_without_hub() {
    let (hub, handle) = Hub::new(HubConfig::default());
    drop(hub);

    let (connection, _peer) = InMemoryConnection::pair();
    let registry: Arc<dyn Registry> = Arc::new(handle);
    let result = ConnectionPump::new(connection, registry, PumpConfig::default())
        .start()
        .await;

    assert!(result.is_err());
}

// =============================================================================
// Write ordering
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_senders_keep_per_sender_order() {
    const SENDERS: usize = 3;
    const PER_SENDER: usize = 50;

    let hub = hub(EchoPolicy::ExcludeSender);
    let (mut receiver, _receiver_pump) = connect(&hub).await;

    let mut senders = Vec::new();
    for _ in 0..SENDERS {
        senders.push(connect(&hub).await);
    }

    // Interleave the senders so their frames hit the hub concurrently.
    for i in 0..PER_SENDER {
        for (peer, _) in &senders {
            assert!(peer.send_text(&format!(r#"{{"text":"{i}"}}"#)));
        }
    }

    let received = receive(&mut receiver, SENDERS * PER_SENDER).await;
    assert_eq!(received.len(), SENDERS * PER_SENDER);

    for (_, pump) in &senders {
        let id = pump.id();
        let texts: Vec<usize> = received
            .iter()
            .filter(|p| p["senderId"] == id.to_string())
            .map(|p| p["text"].as_str().unwrap().parse().unwrap())
            .collect();
        assert_eq!(texts, (0..PER_SENDER).collect::<Vec<_>>());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn queued_payloads_arrive_in_order_in_nonempty_sessions(
        texts in prop::collection::vec("[a-z]{0,8}", 1..40)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (sessions, delivered) = runtime.block_on(async {
            let hub = hub(EchoPolicy::ExcludeSender);
            let (mut peer, _pump) = connect(&hub).await;
            let sender = PumpId::new();

            for text in &texts {
                hub.broadcast(BroadcastMessage::new(sender, text.clone())).await.unwrap();
            }

            let mut sessions = Vec::new();
            let mut delivered = Vec::new();
            while delivered.len() < texts.len() {
                let session = peer.next_session().await.unwrap();
                let batch = payloads(session);
                sessions.push(batch.len());
                delivered.extend(batch.into_iter().map(|p| p["text"].as_str().unwrap().to_string()));
            }
            (sessions, delivered)
        });

        prop_assert!(sessions.iter().all(|&n| n > 0));
        prop_assert_eq!(delivered, texts);
    }
}

//! Integration tests for the message delivery tracker

use fieldmesh_net::{
    DeliveryCallback, DeliveryConfig, DeliveryStatus, Destination, Frame, MemoryNetwork,
    MessageDeliveryTracker, MessageId, RawTransport, SendOptions, TransportError,
    EMERGENCY_PRIORITY,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

static INIT: Once = Once::new();

/// Initialize logging for tests
fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("fieldmesh_net=debug")
            .with_test_writer()
            .try_init();
    });
}

/// Transport that accepts everything and remembers it
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(Vec<u8>, Destination)>>,
}

impl RecordingTransport {
    fn sent_ids(&self) -> Vec<MessageId> {
        self.sent
            .lock()
            .iter()
            .map(|(bytes, _)| Frame::decode(bytes).unwrap().message_id)
            .collect()
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl RawTransport for RecordingTransport {
    fn send_raw(&self, bytes: &[u8], destination: &Destination) -> Result<(), TransportError> {
        self.sent.lock().push((bytes.to_vec(), destination.clone()));
        Ok(())
    }
}

type Outcomes = Arc<Mutex<Vec<(MessageId, DeliveryStatus)>>>;

fn recorder(outcomes: &Outcomes) -> Option<DeliveryCallback> {
    let sink = outcomes.clone();
    Some(Box::new(move |id, status| sink.lock().push((id, status))))
}

fn tracker_with(config: DeliveryConfig) -> (MessageDeliveryTracker, Arc<RecordingTransport>) {
    init_test_logging();
    let transport = Arc::new(RecordingTransport::default());
    let tracker = MessageDeliveryTracker::new("tractor-a".into(), transport.clone(), config);
    (tracker, transport)
}

fn acked(priority: u8, max_retries: u32, retry_ms: u64) -> SendOptions {
    SendOptions {
        priority,
        requires_ack: true,
        max_retries,
        retry_interval: Duration::from_millis(retry_ms),
        timeout: Duration::from_secs(60),
    }
}

#[test]
fn retry_exhaustion_sends_four_times_and_fails_once() {
    let (mut tracker, transport) = tracker_with(DeliveryConfig::default());
    let outcomes = Outcomes::default();
    let start = Instant::now();

    let id = tracker.send_at(
        start,
        Destination::Peer("tractor-b".into()),
        json!({"msg_type": "TASK_CLAIM"}),
        acked(3, 3, 100),
        recorder(&outcomes),
    );

    for step in 0..=100u64 {
        tracker.tick_at(start + Duration::from_millis(step * 50));
    }

    assert_eq!(transport.sent_count(), 4);
    assert_eq!(*outcomes.lock(), vec![(id, DeliveryStatus::Failed)]);
    assert!(!tracker.is_tracked(&id));
    let stats = tracker.stats();
    assert_eq!(stats.retransmissions, 3);
    assert_eq!(stats.failed, 1);
}

#[test]
fn emergency_serviced_before_routine_traffic() {
    let config = DeliveryConfig {
        max_sends_per_tick: 1,
        ..Default::default()
    };
    let (mut tracker, transport) = tracker_with(config);
    let start = Instant::now();

    let routine = tracker.send_at(start, Destination::Broadcast, json!("routine"), acked(5, 3, 500), None);
    let emergency = tracker.send_at(
        start + Duration::from_millis(10),
        Destination::Broadcast,
        json!("stop"),
        acked(EMERGENCY_PRIORITY, 3, 50),
        None,
    );

    let now = start + Duration::from_millis(20);
    assert_eq!(tracker.tick_at(now), 1);
    assert_eq!(tracker.tick_at(now), 1);
    assert_eq!(transport.sent_ids(), vec![emergency, routine]);
}

#[test]
fn transmit_budget_leaves_backlog_for_next_tick() {
    let config = DeliveryConfig {
        max_sends_per_tick: 2,
        ..Default::default()
    };
    let (mut tracker, transport) = tracker_with(config);
    let now = Instant::now();
    for i in 0..5 {
        tracker.send_at(now, Destination::Broadcast, json!(i), SendOptions::unacked(5), None);
    }

    assert_eq!(tracker.tick_at(now), 2);
    assert_eq!(tracker.next_deadline(), Some(now));
    assert_eq!(tracker.tick_at(now), 2);
    assert_eq!(tracker.tick_at(now), 1);
    assert_eq!(transport.sent_count(), 5);
    assert_eq!(tracker.tracked_count(), 0);
}

#[test]
fn eviction_takes_oldest_of_lowest_priority() {
    let config = DeliveryConfig {
        capacity: 2,
        ..Default::default()
    };
    let (mut tracker, _transport) = tracker_with(config);
    let outcomes = Outcomes::default();
    let now = Instant::now();

    let old_low = tracker.send_at(now, Destination::Broadcast, json!(1), acked(7, 3, 100), recorder(&outcomes));
    let new_low = tracker.send_at(now, Destination::Broadcast, json!(2), acked(7, 3, 100), recorder(&outcomes));
    let medium = tracker.send_at(now, Destination::Broadcast, json!(3), acked(3, 3, 100), recorder(&outcomes));

    assert!(!tracker.is_tracked(&old_low));
    assert!(tracker.is_tracked(&new_low));
    assert!(tracker.is_tracked(&medium));

    // Eviction is reported on the next tick, not inside send
    assert!(outcomes.lock().is_empty());
    tracker.tick_at(now);
    assert_eq!(*outcomes.lock(), vec![(old_low, DeliveryStatus::Failed)]);
    assert_eq!(tracker.stats().evicted, 1);
}

#[test]
fn emergency_messages_are_never_evicted() {
    let config = DeliveryConfig {
        capacity: 2,
        ..Default::default()
    };
    let (mut tracker, _transport) = tracker_with(config);
    let now = Instant::now();

    let e1 = tracker.send_at(now, Destination::Broadcast, json!(1), acked(0, 5, 50), None);
    let e2 = tracker.send_at(now, Destination::Broadcast, json!(2), acked(0, 5, 50), None);
    let routine = tracker.send_at(now, Destination::Broadcast, json!(3), acked(5, 5, 50), None);
    assert!(!tracker.is_tracked(&routine));

    let e3 = tracker.send_at(now, Destination::Broadcast, json!(4), acked(0, 5, 50), None);
    assert_eq!(tracker.tracked_count(), 3);
    for id in [e1, e2, e3] {
        assert!(tracker.is_tracked(&id));
    }
}

#[test]
fn cancel_suppresses_callback() {
    let (mut tracker, transport) = tracker_with(DeliveryConfig::default());
    let outcomes = Outcomes::default();
    let now = Instant::now();

    let id = tracker.send_at(now, Destination::Broadcast, json!(null), acked(5, 3, 100), recorder(&outcomes));
    assert!(tracker.cancel(id));
    assert!(!tracker.cancel(id));

    tracker.tick_at(now + Duration::from_secs(10));
    assert_eq!(transport.sent_count(), 0);
    assert!(outcomes.lock().is_empty());
    assert_eq!(tracker.stats().cancelled, 1);
}

#[test]
fn ack_and_duplicate_suppression_over_memory_network() {
    init_test_logging();
    let network = MemoryNetwork::new();
    let (transport_a, mut inbox_a) = network.register("tractor-a".into());
    let (transport_b, mut inbox_b) = network.register("tractor-b".into());
    let mut a = MessageDeliveryTracker::new("tractor-a".into(), Arc::new(transport_a), DeliveryConfig::default());
    let mut b = MessageDeliveryTracker::new("tractor-b".into(), Arc::new(transport_b), DeliveryConfig::default());
    let outcomes = Outcomes::default();
    let start = Instant::now();

    let id = a.send_at(
        start,
        Destination::Peer("tractor-b".into()),
        json!({"section_id": "north-40"}),
        acked(3, 5, 100),
        recorder(&outcomes),
    );

    // First transmission and a retry before any ack arrives
    a.tick_at(start);
    a.tick_at(start + Duration::from_millis(100));
    let first = inbox_b.try_recv().unwrap();
    let second = inbox_b.try_recv().unwrap();

    let inbound = b.receive_frame(&first).unwrap();
    assert_eq!(inbound.message_id, id);
    assert_eq!(inbound.sender.as_str(), "tractor-a");
    assert_eq!(inbound.payload["section_id"], "north-40");
    assert!(b.receive_frame(&second).is_none());
    assert_eq!(b.stats().duplicates_dropped, 1);

    // Both copies were acked
    let ack = inbox_a.try_recv().unwrap();
    assert!(inbox_a.try_recv().is_ok());
    assert!(a.receive_frame(&ack).is_none());
    assert_eq!(*outcomes.lock(), vec![(id, DeliveryStatus::Delivered)]);
    assert!(!a.on_ack_received(id));
}

#[test]
fn delivery_survives_lossy_medium() {
    init_test_logging();
    let network = MemoryNetwork::with_seed(42);
    network.set_loss_probability(0.3);
    let (transport_a, mut inbox_a) = network.register("tractor-a".into());
    let (transport_b, mut inbox_b) = network.register("tractor-b".into());
    let mut a = MessageDeliveryTracker::new("tractor-a".into(), Arc::new(transport_a), DeliveryConfig::default());
    let mut b = MessageDeliveryTracker::new("tractor-b".into(), Arc::new(transport_b), DeliveryConfig::default());
    let outcomes = Outcomes::default();
    let start = Instant::now();

    let options = SendOptions {
        retry_interval: Duration::from_millis(10),
        max_retries: 40,
        ..acked(3, 40, 10)
    };
    a.send_at(start, Destination::Peer("tractor-b".into()), json!("hello"), options, recorder(&outcomes));

    let mut received = 0;
    for step in 0..6000u64 {
        let now = start + Duration::from_millis(step * 10);
        a.tick_at(now);
        b.tick_at(now);
        while let Ok(bytes) = inbox_b.try_recv() {
            if b.receive_frame(&bytes).is_some() {
                received += 1;
            }
        }
        while let Ok(bytes) = inbox_a.try_recv() {
            a.receive_frame(&bytes);
        }
        if !outcomes.lock().is_empty() {
            break;
        }
    }

    assert_eq!(received, 1);
    assert_eq!(outcomes.lock().first().map(|(_, s)| *s), Some(DeliveryStatus::Delivered));
}

#[tokio::test]
async fn receipt_resolves_on_ack() {
    let (mut tracker, transport) = tracker_with(DeliveryConfig::default());
    let (id, receipt) = tracker.send_with_receipt(
        Destination::Peer("tractor-b".into()),
        json!(null),
        acked(3, 3, 100),
    );
    tracker.tick();
    assert_eq!(transport.sent_count(), 1);

    assert!(tracker.on_ack_received(id));
    assert_eq!(receipt.await.unwrap(), DeliveryStatus::Delivered);
}

#[test]
fn malformed_datagrams_are_dropped() {
    let (mut tracker, _transport) = tracker_with(DeliveryConfig::default());
    assert!(tracker.receive_frame(b"{not json").is_none());
    assert!(tracker.receive_frame(&[]).is_none());
    assert!(tracker.on_message_received(uuid::Uuid::new_v4()));
}

//! Guaranteed delivery over an unreliable transport.
//!
//! Scheduling uses two min-heaps:
//!
//! - `timers`, keyed by next due time, holds every pending message
//! - `ready`, keyed by `(priority, due, seq)`, holds messages whose time has come
//!
//! Each tick moves due timers into `ready` and then services `ready` in priority
//! order until the per-tick transmit budget runs out, so an emergency frame that
//! became due later still goes out before routine traffic. Heap entries are never
//! removed eagerly; stale ones are skipped when popped.

use crate::config::DeliveryConfig;
use crate::delivery::dedup::DedupWindow;
use crate::delivery::message::{
    DeliveryCallback, DeliveryState, DeliveryStatus, InboundMessage, ReliableMessage,
    SendOptions, TrackerStats, EMERGENCY_PRIORITY,
};
use crate::frame::{Frame, FrameBody, MessageId};
use crate::observability as obs;
use crate::transport::{Destination, RawTransport};
use fieldmesh_core::VehicleId;
use metrics::{counter, gauge};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Smallest retry interval the scheduler accepts.
const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Stand-in for "never" when a deadline does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 3600);

/// `now + delay`, saturating at a far-future instant instead of overflowing.
pub fn instant_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

type Completion = (MessageId, DeliveryStatus, Option<DeliveryCallback>);

enum Service {
    Fail,
    Transmit,
}

/// Tracks outstanding messages until acked, failed, evicted or cancelled.
pub struct MessageDeliveryTracker {
    local_id: VehicleId,
    transport: Arc<dyn RawTransport>,
    config: DeliveryConfig,
    messages: HashMap<MessageId, ReliableMessage>,
    timers: BinaryHeap<Reverse<(Instant, u64, MessageId)>>,
    ready: BinaryHeap<Reverse<(u8, Instant, u64, MessageId)>>,
    // First entry is the oldest message of the lowest priority class
    eviction: BTreeSet<(Reverse<u8>, u64, MessageId)>,
    deferred: VecDeque<Completion>,
    deferred_since: Option<Instant>,
    dedup: DedupWindow,
    next_seq: u64,
    stats: TrackerStats,
}

impl MessageDeliveryTracker {
    /// Creates a tracker sending as `local_id` through `transport`.
    pub fn new(local_id: VehicleId, transport: Arc<dyn RawTransport>, config: DeliveryConfig) -> Self {
        let dedup = DedupWindow::new(config.dedup_window);
        Self {
            local_id,
            transport,
            config,
            messages: HashMap::new(),
            timers: BinaryHeap::new(),
            ready: BinaryHeap::new(),
            eviction: BTreeSet::new(),
            deferred: VecDeque::new(),
            deferred_since: None,
            dedup,
            next_seq: 0,
            stats: TrackerStats::default(),
        }
    }

    /// Vehicle id stamped on outgoing frames.
    pub fn local_id(&self) -> &VehicleId {
        &self.local_id
    }

    /// Underlying transport.
    pub fn transport(&self) -> &Arc<dyn RawTransport> {
        &self.transport
    }

    /// Queues a message for transmission on the next tick.
    ///
    /// `on_delivery` is never invoked from inside this call.
    pub fn send(
        &mut self,
        destination: Destination,
        payload: serde_json::Value,
        options: SendOptions,
        on_delivery: Option<DeliveryCallback>,
    ) -> MessageId {
        self.send_at(Instant::now(), destination, payload, options, on_delivery)
    }

    /// [`send`](Self::send) with an explicit current time.
    pub fn send_at(
        &mut self,
        now: Instant,
        destination: Destination,
        payload: serde_json::Value,
        options: SendOptions,
        on_delivery: Option<DeliveryCallback>,
    ) -> MessageId {
        let message_id = Uuid::new_v4();
        let frame = match Frame::data(message_id, self.local_id.clone(), options.requires_ack, payload).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%message_id, error = %e, "Message cannot be framed, failing it");
                self.stats.failed += 1;
                counter!(obs::FAILED).increment(1);
                self.defer(now, (message_id, DeliveryStatus::Failed, on_delivery));
                return message_id;
            }
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        let cap = self.config.max_retry_interval().max(MIN_RETRY_INTERVAL);

        let message = ReliableMessage {
            message_id,
            destination,
            frame,
            priority: options.priority,
            requires_ack: options.requires_ack,
            retry_count: 0,
            max_retries: options.max_retries,
            retry_interval: options.retry_interval.clamp(MIN_RETRY_INTERVAL, cap),
            deadline: instant_after(now, options.timeout),
            delivery_state: DeliveryState::Pending,
            transmissions: 0,
            next_due: now,
            seq,
            ready: false,
            on_delivery,
        };
        trace!(%message_id, priority = options.priority, destination = %message.destination, "Tracking message");

        self.timers.push(Reverse((now, seq, message_id)));
        self.eviction.insert((Reverse(options.priority), seq, message_id));
        self.messages.insert(message_id, message);
        self.enforce_capacity(now);
        gauge!(obs::TRACKED_MESSAGES).set(self.messages.len() as f64);

        message_id
    }

    /// Like [`send`](Self::send) but reports the outcome on a oneshot channel.
    pub fn send_with_receipt(
        &mut self,
        destination: Destination,
        payload: serde_json::Value,
        options: SendOptions,
    ) -> (MessageId, oneshot::Receiver<DeliveryStatus>) {
        let (tx, rx) = oneshot::channel();
        let callback: DeliveryCallback = Box::new(move |_, status| {
            let _ = tx.send(status);
        });
        let id = self.send(destination, payload, options, Some(callback));
        (id, rx)
    }

    /// Confirms delivery of `message_id`. Returns `false` for unknown ids.
    pub fn on_ack_received(&mut self, message_id: MessageId) -> bool {
        let awaiting = self
            .messages
            .get(&message_id)
            .is_some_and(|m| m.requires_ack);
        if !awaiting {
            trace!(%message_id, "Ack for untracked message");
            return false;
        }

        self.stats.acks_received += 1;
        counter!(obs::ACKS_RECEIVED).increment(1);
        if let Some(completion) = self.finish(message_id, DeliveryStatus::Delivered) {
            Self::invoke(completion);
        }
        true
    }

    /// Records an inbound message id. Returns `true` the first time it is seen.
    pub fn on_message_received(&mut self, message_id: MessageId) -> bool {
        self.dedup.insert(message_id)
    }

    /// Decodes one inbound datagram.
    ///
    /// Acks are matched, data frames that require it are acked (duplicates too, so a
    /// lost ack gets repaired), and first-time data frames are returned. Malformed
    /// datagrams and our own echoes are dropped.
    pub fn receive_frame(&mut self, bytes: &[u8]) -> Option<InboundMessage> {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "Dropping malformed datagram");
                counter!(obs::MALFORMED_FRAMES).increment(1);
                return None;
            }
        };
        if frame.sender == self.local_id {
            return None;
        }

        match frame.body {
            FrameBody::Ack { acked } => {
                self.on_ack_received(acked);
                None
            }
            FrameBody::Data { requires_ack, payload } => {
                if requires_ack {
                    self.send_ack(&frame.sender, frame.message_id);
                }
                if !self.on_message_received(frame.message_id) {
                    self.stats.duplicates_dropped += 1;
                    counter!(obs::DUPLICATES_DROPPED).increment(1);
                    trace!(message_id = %frame.message_id, sender = %frame.sender, "Duplicate suppressed");
                    return None;
                }
                Some(InboundMessage {
                    message_id: frame.message_id,
                    sender: frame.sender,
                    payload,
                })
            }
        }
    }

    /// Removes a message without invoking its callback.
    pub fn cancel(&mut self, message_id: MessageId) -> bool {
        match self.messages.remove(&message_id) {
            Some(message) => {
                self.eviction
                    .remove(&(Reverse(message.priority), message.seq, message_id));
                self.stats.cancelled += 1;
                gauge!(obs::TRACKED_MESSAGES).set(self.messages.len() as f64);
                debug!(%message_id, "Message cancelled");
                true
            }
            None => false,
        }
    }

    /// Services due messages. Returns the number of transmissions made.
    pub fn tick(&mut self) -> usize {
        self.tick_at(Instant::now())
    }

    /// [`tick`](Self::tick) with an explicit current time.
    pub fn tick_at(&mut self, now: Instant) -> usize {
        self.flush_deferred();

        while let Some(&Reverse((due, _, message_id))) = self.timers.peek() {
            if due > now {
                break;
            }
            self.timers.pop();
            if let Some(message) = self.messages.get_mut(&message_id) {
                if !message.ready && message.next_due == due {
                    message.ready = true;
                    self.ready
                        .push(Reverse((message.priority, due, message.seq, message_id)));
                }
            }
        }

        let mut sent = 0;
        while sent < self.config.max_sends_per_tick {
            let Some(Reverse((_, _, _, message_id))) = self.ready.pop() else {
                break;
            };
            let Some(message) = self.messages.get_mut(&message_id) else {
                continue;
            };
            if !message.ready {
                continue;
            }
            message.ready = false;

            let service = if now >= message.deadline {
                debug!(%message_id, "Deadline passed");
                Service::Fail
            } else if message.transmissions > 0 {
                message.retry_count += 1;
                if message.retry_count > message.max_retries {
                    debug!(%message_id, transmissions = message.transmissions, "Retries exhausted");
                    Service::Fail
                } else {
                    Service::Transmit
                }
            } else {
                Service::Transmit
            };

            match service {
                Service::Fail => {
                    if let Some(completion) = self.finish(message_id, DeliveryStatus::Failed) {
                        Self::invoke(completion);
                    }
                }
                Service::Transmit => {
                    sent += 1;
                    if self.transmit(now, message_id) {
                        if let Some(completion) = self.finish(message_id, DeliveryStatus::Delivered) {
                            Self::invoke(completion);
                        }
                    }
                }
            }
        }

        if !self.ready.is_empty() && sent == self.config.max_sends_per_tick {
            trace!(backlog = self.ready.len(), "Transmit budget exhausted for this tick");
        }
        sent
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let ready = self.ready.peek().map(|Reverse((_, due, _, _))| *due);
        let timer = self.timers.peek().map(|Reverse((due, _, _))| *due);
        [self.deferred_since, ready, timer].into_iter().flatten().min()
    }

    /// Whether `message_id` is still outstanding.
    pub fn is_tracked(&self, message_id: &MessageId) -> bool {
        self.messages.contains_key(message_id)
    }

    /// Number of outstanding messages.
    pub fn tracked_count(&self) -> usize {
        self.messages.len()
    }

    /// Outstanding message by id.
    pub fn get(&self, message_id: &MessageId) -> Option<&ReliableMessage> {
        self.messages.get(message_id)
    }

    /// Counters since creation.
    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            tracked: self.messages.len(),
            ..self.stats
        }
    }

    /// Hands the message to the transport and schedules the next firing.
    ///
    /// Returns `true` when a fire-and-forget message was accepted and is done.
    fn transmit(&mut self, now: Instant, message_id: MessageId) -> bool {
        let backoff = self.config.backoff_factor;
        let cap = self.config.max_retry_interval().max(MIN_RETRY_INTERVAL);
        let Some(message) = self.messages.get_mut(&message_id) else {
            return false;
        };

        let result = self.transport.send_raw(&message.frame, &message.destination);
        message.transmissions += 1;

        match result {
            Ok(()) => {
                self.stats.frames_sent += 1;
                counter!(obs::FRAMES_SENT).increment(1);
                if message.transmissions > 1 {
                    self.stats.retransmissions += 1;
                    counter!(obs::RETRANSMISSIONS).increment(1);
                }
                trace!(%message_id, attempt = message.transmissions, "Frame sent");
                if !message.requires_ack {
                    return true;
                }
            }
            Err(e) => {
                self.stats.refused += 1;
                counter!(obs::TRANSPORT_REFUSALS).increment(1);
                debug!(%message_id, error = %e, destination = %message.destination, "Transport refused frame");
            }
        }

        let next_due = instant_after(now, message.retry_interval).min(message.deadline);
        message.next_due = next_due;
        message.retry_interval = Duration::try_from_secs_f64(message.retry_interval.as_secs_f64() * backoff)
            .map_or(cap, |next| next.min(cap));
        self.timers.push(Reverse((next_due, message.seq, message_id)));
        false
    }

    fn send_ack(&self, to: &VehicleId, acked: MessageId) {
        match Frame::ack(self.local_id.clone(), acked).encode() {
            Ok(bytes) => {
                if let Err(e) = self.transport.send_raw(&bytes, &Destination::Peer(to.clone())) {
                    debug!(%acked, %to, error = %e, "Ack not sent");
                }
            }
            Err(e) => warn!(%acked, error = %e, "Ack cannot be framed"),
        }
    }

    fn enforce_capacity(&mut self, now: Instant) {
        while self.messages.len() > self.config.capacity {
            let Some(&(Reverse(priority), _, victim)) = self.eviction.iter().next() else {
                break;
            };
            if priority == EMERGENCY_PRIORITY {
                warn!(
                    tracked = self.messages.len(),
                    capacity = self.config.capacity,
                    "Only emergency traffic left, capacity exceeded"
                );
                break;
            }

            debug!(message_id = %victim, priority, "Evicting message");
            self.stats.evicted += 1;
            counter!(obs::EVICTED).increment(1);
            if let Some(completion) = self.finish(victim, DeliveryStatus::Failed) {
                self.defer(now, completion);
            }
        }
    }

    fn finish(&mut self, message_id: MessageId, status: DeliveryStatus) -> Option<Completion> {
        let mut message = self.messages.remove(&message_id)?;
        self.eviction
            .remove(&(Reverse(message.priority), message.seq, message_id));

        match status {
            DeliveryStatus::Delivered => {
                message.delivery_state = DeliveryState::Acknowledged;
                self.stats.delivered += 1;
                counter!(obs::DELIVERED).increment(1);
            }
            DeliveryStatus::Failed => {
                message.delivery_state = DeliveryState::Failed;
                self.stats.failed += 1;
                counter!(obs::FAILED).increment(1);
                debug!(%message_id, transmissions = message.transmissions, "Delivery failed");
            }
        }
        gauge!(obs::TRACKED_MESSAGES).set(self.messages.len() as f64);

        Some((message_id, status, message.on_delivery.take()))
    }

    fn defer(&mut self, now: Instant, completion: Completion) {
        self.deferred_since.get_or_insert(now);
        self.deferred.push_back(completion);
    }

    fn flush_deferred(&mut self) {
        self.deferred_since = None;
        while let Some(completion) = self.deferred.pop_front() {
            Self::invoke(completion);
        }
    }

    fn invoke((message_id, status, callback): Completion) {
        if let Some(callback) = callback {
            callback(message_id, status);
        }
    }
}

impl std::fmt::Debug for MessageDeliveryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDeliveryTracker")
            .field("local_id", &self.local_id)
            .field("tracked", &self.messages.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

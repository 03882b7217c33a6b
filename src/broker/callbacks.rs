//! Wake targets signalled by nodes on every publish
//!
//! Callbacks run in the publisher's context, so only primitives that cannot
//! block are accepted: an [`EventNotifier`] or a bounded channel fed with
//! `try_send`.

use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    mpsc::{SyncSender, TrySendError},
    Arc,
};

use parking_lot::Mutex;

use crate::sync::{EventNotifier, GenerationNumber};
use crate::time::{self, AbsoluteTime};
use crate::topic::TopicId;

/// Identity of a registered callback
pub type CallbackId = u64;

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh callback id
pub(crate) fn next_callback_id() -> CallbackId {
    NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed)
}

/// Posted to queue targets on publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeEvent {
    pub topic_id: TopicId,
    pub instance: u8,
    /// Generation of the sample that triggered the wake
    pub generation: GenerationNumber,
}

/// Non-blocking primitive a node signals on publish
#[derive(Debug, Clone)]
pub enum WakeTarget {
    /// Signal a shared notifier
    Notifier(Arc<EventNotifier>),
    /// Post an event to a bounded queue; dropped when the queue is full
    Queue(SyncSender<WakeEvent>),
}

impl WakeTarget {
    fn wake(&self, event: WakeEvent) {
        match self {
            WakeTarget::Notifier(notifier) => {
                if notifier.notify().is_err() {
                    log::debug!("notifier wake failed for topic {}", event.topic_id);
                }
            }
            WakeTarget::Queue(sender) => {
                // a full queue already holds a pending wake; the sample stays in the node
                if let Err(TrySendError::Disconnected(_)) = sender.try_send(event) {
                    log::debug!("wake queue for topic {} disconnected", event.topic_id);
                }
            }
        }
    }
}

/// Delivery pacing shared by a subscription and its callbacks
#[derive(Debug)]
pub struct IntervalGate {
    interval_us: AtomicU32,
    /// Time of the last delivered sample, `NEVER` before the first one
    last_delivery_us: AtomicU64,
}

const NEVER: AbsoluteTime = AbsoluteTime::MAX;

impl Default for IntervalGate {
    fn default() -> Self {
        Self {
            interval_us: AtomicU32::new(0),
            last_delivery_us: AtomicU64::new(NEVER),
        }
    }
}

impl IntervalGate {
    pub fn interval_us(&self) -> u32 {
        self.interval_us.load(Ordering::Relaxed)
    }

    pub fn set_interval_us(&self, interval_us: u32) {
        self.interval_us.store(interval_us, Ordering::Relaxed);
    }

    /// Whether a delivery at `now` respects the interval
    pub fn is_open(&self, now: AbsoluteTime) -> bool {
        self.remaining_us(now) == 0
    }

    /// Microseconds until the next delivery is allowed
    pub fn remaining_us(&self, now: AbsoluteTime) -> u64 {
        let interval = self.interval_us() as u64;
        let last = self.last_delivery_us.load(Ordering::Relaxed);
        if interval == 0 || last == NEVER {
            return 0;
        }
        interval.saturating_sub(now.saturating_sub(last))
    }

    /// Record a delivery at `now`.
    ///
    /// The timestamp advances by one interval but stays within
    /// `[now - interval, now]`, which keeps the average rate at the interval
    /// without bursting after a stall.
    pub fn record_delivery(&self, now: AbsoluteTime) {
        let interval = self.interval_us() as u64;
        let last = self.last_delivery_us.load(Ordering::Relaxed);
        let next = if interval == 0 || last == NEVER {
            now
        } else {
            last.saturating_add(interval)
                .clamp(now.saturating_sub(interval), now)
        };
        self.last_delivery_us.store(next, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct CallbackEntry {
    id: CallbackId,
    target: WakeTarget,
    gate: Option<Arc<IntervalGate>>,
}

/// Callbacks registered on one node
#[derive(Debug, Default)]
pub(crate) struct CallbackList {
    entries: Mutex<Vec<CallbackEntry>>,
}

impl CallbackList {
    /// Register a target; re-registering an id replaces its target
    pub fn register(&self, id: CallbackId, target: WakeTarget, gate: Option<Arc<IntervalGate>>) {
        let mut entries = self.entries.lock();
        entries.retain(|entry| entry.id != id);
        entries.push(CallbackEntry { id, target, gate });
    }

    /// Remove a target, returns whether it was registered
    pub fn unregister(&self, id: CallbackId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake every target whose gate is open, returns how many were woken
    pub fn wake_all(&self, event: WakeEvent) -> usize {
        let entries = self.entries.lock();
        if entries.is_empty() {
            return 0;
        }

        let now = time::absolute_time_us();
        let mut woken = 0;
        for entry in entries.iter() {
            if entry.gate.as_ref().map_or(true, |gate| gate.is_open(now)) {
                entry.target.wake(event);
                woken += 1;
            }
        }
        woken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn event(generation: u32) -> WakeEvent {
        WakeEvent {
            topic_id: 3,
            instance: 0,
            generation,
        }
    }

    #[test]
    fn test_queue_target_never_blocks() {
        let (tx, rx) = mpsc::sync_channel(1);
        let list = CallbackList::default();
        list.register(next_callback_id(), WakeTarget::Queue(tx), None);

        assert_eq!(list.wake_all(event(1)), 1);
        // queue full: the second event is dropped instead of blocking
        assert_eq!(list.wake_all(event(2)), 1);

        assert_eq!(rx.try_recv().unwrap().generation, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_register_replaces_same_id() {
        let list = CallbackList::default();
        let id = next_callback_id();
        let notifier = Arc::new(EventNotifier::new().unwrap());

        list.register(id, WakeTarget::Notifier(notifier.clone()), None);
        list.register(id, WakeTarget::Notifier(notifier), None);
        assert_eq!(list.len(), 1);

        assert!(list.unregister(id));
        assert!(!list.unregister(id));
        assert!(list.is_empty());
    }

    #[test]
    fn test_gate_suppresses_wake() {
        let (tx, rx) = mpsc::sync_channel(4);
        let gate = Arc::new(IntervalGate::default());
        gate.set_interval_us(60_000_000);
        gate.record_delivery(time::absolute_time_us());

        let list = CallbackList::default();
        list.register(next_callback_id(), WakeTarget::Queue(tx), Some(gate));
        assert_eq!(list.wake_all(event(1)), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_interval_gate_bookkeeping() {
        let gate = IntervalGate::default();
        assert!(gate.is_open(0));

        gate.set_interval_us(1_000);
        assert!(gate.is_open(5_000));
        gate.record_delivery(5_000);
        assert!(!gate.is_open(5_500));
        assert_eq!(gate.remaining_us(5_500), 500);
        assert!(gate.is_open(6_000));

        // on time: advances by exactly one interval
        gate.record_delivery(6_100);
        assert!(gate.is_open(7_000));

        // after a stall the timestamp is pulled up to now - interval
        gate.record_delivery(50_000);
        assert!(gate.is_open(50_000));
        gate.record_delivery(50_000);
        assert!(!gate.is_open(50_500));
    }
}

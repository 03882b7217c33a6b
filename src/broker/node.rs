//! Device nodes: storage and visibility for one (topic, instance)

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    Arc,
};

use parking_lot::RwLock;

use crate::config::MAX_QUEUE_SIZE;
use crate::error::{BusError, Result};
use crate::sync::{Generation, GenerationNumber};
use crate::topic::TopicMetadata;

use super::callbacks::{CallbackId, CallbackList, IntervalGate, WakeEvent, WakeTarget};
use super::stats::NodeStatus;

/// Round a requested queue depth up to a power of two within `1..=MAX_QUEUE_SIZE`
pub fn round_queue_size(requested: usize) -> usize {
    requested.clamp(1, MAX_QUEUE_SIZE).next_power_of_two()
}

#[derive(Debug)]
struct SampleBuffer {
    storage: Box<[u8]>,
    /// Total samples written, never wraps in practice
    published: u64,
}

/// One live instance of one topic
///
/// Holds the last `queue_size` samples in a ring indexed by
/// `generation & (queue_size - 1)`. Writers are serialized by the buffer
/// lock; the generation is bumped with release ordering only after the
/// sample is complete, so a reader that observes generation `g` can copy
/// sample `g - 1` without seeing a torn record.
#[derive(Debug)]
pub struct DeviceNode {
    meta: &'static TopicMetadata,
    instance: u8,
    queue_size: AtomicUsize,
    buffer: RwLock<Option<SampleBuffer>>,
    generation: Generation,
    advertised: AtomicBool,
    publishers: AtomicU32,
    subscribers: AtomicU32,
    callbacks: CallbackList,
}

impl DeviceNode {
    pub(crate) fn new(meta: &'static TopicMetadata, instance: u8, queue_size: usize) -> Self {
        Self {
            meta,
            instance,
            queue_size: AtomicUsize::new(round_queue_size(queue_size)),
            buffer: RwLock::new(None),
            generation: Generation::new(),
            advertised: AtomicBool::new(false),
            publishers: AtomicU32::new(0),
            subscribers: AtomicU32::new(0),
            callbacks: CallbackList::default(),
        }
    }

    pub fn meta(&self) -> &'static TopicMetadata {
        self.meta
    }

    pub fn name(&self) -> &'static str {
        self.meta.name
    }

    pub fn instance(&self) -> u8 {
        self.instance
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size.load(Ordering::Relaxed)
    }

    /// Current generation (number of samples written, wrapping)
    pub fn generation(&self) -> GenerationNumber {
        self.generation.load_acquire()
    }

    /// Whether at least one sample has been written
    pub fn data_valid(&self) -> bool {
        self.buffer.read().is_some()
    }

    /// Whether a producer currently owns the node
    pub fn is_advertised(&self) -> bool {
        self.advertised.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> u32 {
        self.subscribers.load(Ordering::Acquire)
    }

    pub fn publisher_count(&self) -> u32 {
        self.publishers.load(Ordering::Acquire)
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.meta.size {
            return Err(BusError::invalid_parameter(
                "buffer",
                format!("{} expects {} bytes, got {}", self.meta.name, self.meta.size, len),
            ));
        }
        Ok(())
    }

    fn allocate(&self, queue_size: usize) -> Result<SampleBuffer> {
        let len = self.meta.size.checked_mul(queue_size).ok_or_else(|| {
            BusError::allocation_failure(self.meta.name, "buffer size overflows")
        })?;

        let mut storage = Vec::new();
        storage.try_reserve_exact(len).map_err(|e| {
            log::warn!("{}: sample buffer allocation of {} bytes failed", self.meta.name, len);
            BusError::allocation_failure(self.meta.name, e.to_string())
        })?;
        storage.resize(len, 0);

        Ok(SampleBuffer {
            storage: storage.into_boxed_slice(),
            published: 0,
        })
    }

    /// Store a new sample and wake registered callbacks.
    ///
    /// Returns the generation of the stored sample. The buffer is allocated
    /// on the first write.
    pub fn write(&self, data: &[u8]) -> Result<GenerationNumber> {
        self.check_len(data.len())?;

        let generation = {
            let mut buffer = self.buffer.write();
            let queue_size = self.queue_size();
            let samples = match &mut *buffer {
                Some(samples) => samples,
                empty => empty.insert(self.allocate(queue_size)?),
            };

            let size = self.meta.size;
            let index = self.generation.load_relaxed() as usize & (queue_size - 1);
            samples.storage[index * size..(index + 1) * size].copy_from_slice(data);
            samples.published += 1;

            self.generation.advance_release()
        };

        self.callbacks.wake_all(WakeEvent {
            topic_id: self.meta.id,
            instance: self.instance,
            generation,
        });

        Ok(generation)
    }

    /// Copy the newest sample into `dst`, returning the current generation.
    ///
    /// `Ok(None)` if nothing was ever written.
    pub fn read(&self, dst: &mut [u8]) -> Result<Option<GenerationNumber>> {
        self.check_len(dst.len())?;

        let buffer = self.buffer.read();
        let Some(samples) = buffer.as_ref() else {
            return Ok(None);
        };

        let current = self.generation.load_acquire();
        let index = current.wrapping_sub(1) as usize & (self.queue_size() - 1);
        self.copy_slot(samples, index, dst);
        Ok(Some(current))
    }

    /// Copy the oldest retained sample the cursor has not consumed.
    ///
    /// A cursor that fell further behind than the queue retains jumps to
    /// the oldest retained sample; a cursor that is up to date gets the
    /// newest sample again. Returns `Ok(false)` if nothing was ever written.
    pub fn read_queued(&self, dst: &mut [u8], cursor: &mut GenerationNumber) -> Result<bool> {
        self.check_len(dst.len())?;

        let buffer = self.buffer.read();
        let Some(samples) = buffer.as_ref() else {
            return Ok(false);
        };

        let current = self.generation.load_acquire();
        let queue_size = self.queue_size();
        let retained = samples.published.min(queue_size as u64) as GenerationNumber;

        let mut next = *cursor;
        if next == current {
            next = current.wrapping_sub(1);
        }
        if current.wrapping_sub(next) > retained {
            next = current.wrapping_sub(retained);
        }

        self.copy_slot(samples, next as usize & (queue_size - 1), dst);
        *cursor = next.wrapping_add(1);
        Ok(true)
    }

    fn copy_slot(&self, samples: &SampleBuffer, index: usize, dst: &mut [u8]) {
        let size = self.meta.size;
        dst.copy_from_slice(&samples.storage[index * size..(index + 1) * size]);
    }

    /// Publications since `last_generation`, wrap-safe and saturating
    pub fn updates_available(&self, last_generation: GenerationNumber) -> GenerationNumber {
        self.generation.updates_since(last_generation)
    }

    /// Grow the queue before data flows.
    ///
    /// Requests are rounded up to a power of two. Asking for the current size
    /// always succeeds. Any other size fails with
    /// [`BusError::QueueSizeLocked`] once a sample has been written; before
    /// that, smaller requests leave the node unchanged.
    pub fn update_queue_size(&self, requested: usize) -> Result<usize> {
        let rounded = round_queue_size(requested);
        let buffer = self.buffer.write();
        let current = self.queue_size();

        if rounded == current {
            return Ok(current);
        }
        if buffer.is_some() {
            return Err(BusError::queue_size_locked(self.meta.name, current, rounded));
        }
        if rounded < current {
            return Ok(current);
        }

        self.queue_size.store(rounded, Ordering::Relaxed);
        Ok(rounded)
    }

    pub(crate) fn add_publisher(&self) {
        self.publishers.fetch_add(1, Ordering::AcqRel);
        self.advertised.store(true, Ordering::Release);
    }

    /// Drop one producer reference, returns the remaining count.
    ///
    /// With `unadvertise` the node stops being advertised once the last
    /// producer leaves.
    pub(crate) fn remove_publisher(&self, unadvertise: bool) -> u32 {
        let remaining = self.publishers.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        if remaining == 0 && unadvertise {
            self.advertised.store(false, Ordering::Release);
        }
        remaining
    }

    pub(crate) fn add_internal_subscriber(&self) -> u32 {
        self.subscribers.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn remove_internal_subscriber(&self) -> u32 {
        self.subscribers.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
    }

    /// Attach a wake target. Pending data does not trigger it; callers check
    /// `updates_available` after registering.
    pub fn register_callback(
        &self,
        id: CallbackId,
        target: WakeTarget,
        gate: Option<Arc<IntervalGate>>,
    ) {
        self.callbacks.register(id, target, gate);
    }

    pub fn unregister_callback(&self, id: CallbackId) -> bool {
        self.callbacks.unregister(id)
    }

    /// No producer, no subscriber, no callback
    pub(crate) fn is_reclaimable(&self) -> bool {
        self.publisher_count() == 0
            && !self.is_advertised()
            && self.subscriber_count() == 0
            && self.callbacks.is_empty()
    }

    /// Snapshot for status listings
    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            name: self.meta.name,
            topic_id: self.meta.id,
            instance: self.instance,
            size: self.meta.size,
            queue_size: self.queue_size(),
            generation: self.generation(),
            subscribers: self.subscriber_count(),
            publishers: self.publisher_count(),
            callbacks: self.callback_count(),
            advertised: self.is_advertised(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER: TopicMetadata = TopicMetadata::new("counter", 4, "u32 value;", 50);

    fn node(queue_size: usize) -> DeviceNode {
        DeviceNode::new(&COUNTER, 0, queue_size)
    }

    fn put(node: &DeviceNode, value: u32) -> GenerationNumber {
        node.write(&value.to_ne_bytes()).unwrap()
    }

    fn newest(node: &DeviceNode) -> Option<u32> {
        let mut buf = [0u8; 4];
        node.read(&mut buf).unwrap().map(|_| u32::from_ne_bytes(buf))
    }

    fn next_queued(node: &DeviceNode, cursor: &mut u32) -> u32 {
        let mut buf = [0u8; 4];
        assert!(node.read_queued(&mut buf, cursor).unwrap());
        u32::from_ne_bytes(buf)
    }

    #[test]
    fn test_round_queue_size() {
        assert_eq!(round_queue_size(0), 1);
        assert_eq!(round_queue_size(1), 1);
        assert_eq!(round_queue_size(3), 4);
        assert_eq!(round_queue_size(8), 8);
        assert_eq!(round_queue_size(100), 128);
        assert_eq!(round_queue_size(1000), MAX_QUEUE_SIZE);
    }

    #[test]
    fn test_write_then_read_newest() {
        let node = node(1);
        assert!(!node.data_valid());
        assert_eq!(newest(&node), None);

        assert_eq!(put(&node, 25), 1);
        assert_eq!(put(&node, 26), 2);
        assert!(node.data_valid());
        assert_eq!(newest(&node), Some(26));
        assert_eq!(node.updates_available(0), 2);
        assert_eq!(node.updates_available(2), 0);
    }

    #[test]
    fn test_wrong_size_rejected() {
        let node = node(1);
        assert!(matches!(
            node.write(&[0u8; 3]),
            Err(BusError::InvalidParameter { .. })
        ));
        assert_eq!(node.generation(), 0);
    }

    #[test]
    fn test_queue_size_locked_after_publish() {
        let node = node(1);
        assert_eq!(node.update_queue_size(3).unwrap(), 4);
        // never shrinks
        assert_eq!(node.update_queue_size(2).unwrap(), 4);

        put(&node, 1);
        assert!(matches!(
            node.update_queue_size(16),
            Err(BusError::QueueSizeLocked { current: 4, requested: 16, .. })
        ));
        assert!(node.update_queue_size(1).is_err());
        assert_eq!(node.update_queue_size(4).unwrap(), 4);
        assert_eq!(node.queue_size(), 4);
    }

    #[test]
    fn test_queued_reads_in_order() {
        let node = node(4);
        let mut cursor = 0;
        for value in 1..=3 {
            put(&node, value);
        }

        assert_eq!(next_queued(&node, &mut cursor), 1);
        assert_eq!(next_queued(&node, &mut cursor), 2);
        assert_eq!(next_queued(&node, &mut cursor), 3);
        assert_eq!(cursor, 3);
        // up to date: newest again, cursor unchanged
        assert_eq!(next_queued(&node, &mut cursor), 3);
        assert_eq!(cursor, 3);
    }

    #[test]
    fn test_queued_read_after_overrun() {
        let node = node(4);
        let mut cursor = 0;
        for value in 1..=6 {
            put(&node, value);
        }

        assert_eq!(node.updates_available(cursor), 6);
        assert_eq!(next_queued(&node, &mut cursor), 3);
        assert_eq!(next_queued(&node, &mut cursor), 4);
        assert_eq!(next_queued(&node, &mut cursor), 5);
        assert_eq!(next_queued(&node, &mut cursor), 6);
        assert_eq!(node.updates_available(cursor), 0);
    }

    #[test]
    fn test_single_slot_queued_read() {
        let node = node(1);
        let mut cursor = 0;
        for value in 1..=5 {
            put(&node, value);
        }
        assert_eq!(next_queued(&node, &mut cursor), 5);
        assert_eq!(cursor, 5);
    }

    #[test]
    fn test_publisher_lifecycle() {
        let node = node(1);
        assert!(!node.is_advertised());
        assert!(node.is_reclaimable());

        node.add_publisher();
        node.add_publisher();
        assert!(node.is_advertised());

        assert_eq!(node.remove_publisher(true), 1);
        assert!(node.is_advertised());
        assert_eq!(node.remove_publisher(true), 0);
        assert!(!node.is_advertised());

        assert_eq!(node.add_internal_subscriber(), 1);
        assert!(!node.is_reclaimable());
        assert_eq!(node.remove_internal_subscriber(), 0);
        assert!(node.is_reclaimable());
    }

    #[test]
    fn test_callbacks_woken_on_write() {
        use std::sync::mpsc;

        let node = node(1);
        let (tx, rx) = mpsc::sync_channel(8);
        let id = super::super::callbacks::next_callback_id();
        node.register_callback(id, WakeTarget::Queue(tx), None);

        put(&node, 7);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.topic_id, 50);
        assert_eq!(event.generation, 1);

        assert!(node.unregister_callback(id));
        put(&node, 8);
        assert!(rx.try_recv().is_err());
    }
}

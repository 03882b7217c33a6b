//! Subscriber handles
//!
//! A [`Subscription`] keeps its own cursor into a node's generation counter,
//! so any number of subscribers read the same node independently. Handles
//! created before the producer exists stay unbound and retry the lookup on
//! every access.

use std::{marker::PhantomData, sync::Arc, time::Duration};

use crate::error::{BusError, Result};
use crate::sync::GenerationNumber;
use crate::time;
use crate::topic::{as_bytes_mut, Message, TopicMetadata};

use super::{
    callbacks::{next_callback_id, CallbackId, IntervalGate, WakeTarget},
    manager::Broker,
    node::DeviceNode,
    registry::Registry,
};

/// Where a freshly bound cursor starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartAt {
    /// Node existed when subscribing: its history is not new
    Current,
    /// Node appeared after subscribing: everything it holds is new
    Oldest,
}

/// Consumer handle for one (topic, instance)
#[derive(Debug)]
pub struct Subscription {
    registry: Arc<Registry>,
    meta: &'static TopicMetadata,
    instance: u8,
    node: Option<Arc<DeviceNode>>,
    last_generation: GenerationNumber,
    gate: Arc<IntervalGate>,
    callback: Option<(CallbackId, WakeTarget)>,
}

impl Subscription {
    pub(crate) fn new(registry: Arc<Registry>, meta: &'static TopicMetadata, instance: u8) -> Self {
        let mut subscription = Self {
            registry,
            meta,
            instance,
            node: None,
            last_generation: 0,
            gate: Arc::new(IntervalGate::default()),
            callback: None,
        };
        subscription.subscribe();
        subscription
    }

    pub fn meta(&self) -> &'static TopicMetadata {
        self.meta
    }

    pub fn instance(&self) -> u8 {
        self.instance
    }

    /// Cursor: generation of the last sample consumed
    pub fn last_generation(&self) -> GenerationNumber {
        self.last_generation
    }

    /// Whether the handle is bound to a node
    pub fn valid(&self) -> bool {
        self.node.is_some()
    }

    pub fn node(&self) -> Option<&Arc<DeviceNode>> {
        self.node.as_ref()
    }

    /// Bind now if the node exists. History already in the node is not
    /// reported as new.
    pub fn subscribe(&mut self) -> bool {
        self.bind(StartAt::Current)
    }

    fn bind(&mut self, start: StartAt) -> bool {
        if self.node.is_some() {
            return true;
        }
        match self.registry.attach_subscriber(self.meta, self.instance) {
            Ok(Some(node)) => {
                self.attach(node, start);
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::debug!("{}/{}: not bound: {}", self.meta.name, self.instance, e);
                false
            }
        }
    }

    fn attach(&mut self, node: Arc<DeviceNode>, start: StartAt) {
        self.last_generation = match start {
            StartAt::Current => node.generation(),
            StartAt::Oldest => 0,
        };
        if let Some((id, target)) = &self.callback {
            node.register_callback(*id, target.clone(), Some(self.gate.clone()));
        }
        self.node = Some(node);
    }

    /// Release the node but keep the callback configuration
    fn detach(&mut self) {
        if let Some(node) = self.node.take() {
            if let Some((id, _)) = &self.callback {
                node.unregister_callback(*id);
            }
            self.registry.release_subscriber(&node);
        }
        self.last_generation = 0;
    }

    /// Drop the registered callback and release the node
    pub fn unsubscribe(&mut self) {
        self.unregister_callback();
        self.detach();
    }

    fn ensure_bound(&mut self) -> Option<&Arc<DeviceNode>> {
        if self.node.is_none() {
            self.bind(StartAt::Oldest);
        }
        self.node.as_ref()
    }

    fn bind_or_create(&mut self) -> Result<Arc<DeviceNode>> {
        if let Some(node) = self.ensure_bound() {
            return Ok(node.clone());
        }
        let node = self
            .registry
            .attach_subscriber_or_create(self.meta, self.instance)?;
        self.attach(node.clone(), StartAt::Oldest);
        Ok(node)
    }

    /// Whether a producer currently owns the node
    pub fn advertised(&mut self) -> bool {
        self.ensure_bound().is_some_and(|node| node.is_advertised())
    }

    /// Publications not yet consumed; zero while unbound or unadvertised
    pub fn updates_available(&mut self) -> GenerationNumber {
        let last = self.last_generation;
        match self.ensure_bound() {
            Some(node) if node.is_advertised() => node.updates_available(last),
            _ => 0,
        }
    }

    /// Whether `update` would deliver a sample now. Never moves the cursor.
    pub fn updated(&mut self) -> bool {
        if self.gate.interval_us() != 0 && !self.gate.is_open(time::absolute_time_us()) {
            return false;
        }
        self.updates_available() > 0
    }

    fn record_delivery(&self) {
        if self.gate.interval_us() != 0 {
            self.gate.record_delivery(time::absolute_time_us());
        }
        self.registry.stats().record_copy();
    }

    /// Copy the newest sample and move the cursor to it
    pub fn copy_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.ensure_bound();
        let Some(node) = self.node.as_ref() else {
            return Err(BusError::unbound(self.meta.name, self.instance));
        };
        if !node.is_advertised() {
            return Err(BusError::not_advertised(self.meta.name, self.instance));
        }

        match node.read(dst)? {
            Some(generation) => {
                self.last_generation = generation;
                self.record_delivery();
                Ok(())
            }
            None => Err(BusError::not_advertised(self.meta.name, self.instance)),
        }
    }

    /// Copy only if `updated()`; `Ok(false)` leaves `dst` untouched
    pub fn update_bytes(&mut self, dst: &mut [u8]) -> Result<bool> {
        if !self.updated() {
            return Ok(false);
        }
        match self.copy_bytes(dst) {
            Ok(()) => Ok(true),
            Err(e) if e.is_no_data() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Consume the oldest retained sample not yet seen
    pub fn update_queued_bytes(&mut self, dst: &mut [u8]) -> Result<bool> {
        if !self.updated() {
            return Ok(false);
        }
        let Some(node) = self.node.as_ref() else {
            return Ok(false);
        };
        if node.read_queued(dst, &mut self.last_generation)? {
            self.record_delivery();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn check_type<T: Message>(&self) -> Result<()> {
        if self.meta.same_topic(T::metadata()) {
            Ok(())
        } else {
            Err(BusError::type_mismatch(self.meta.name, T::metadata().name))
        }
    }

    /// Typed [`copy_bytes`](Self::copy_bytes)
    pub fn copy<T: Message>(&mut self, dst: &mut T) -> Result<()> {
        self.check_type::<T>()?;
        self.copy_bytes(as_bytes_mut(dst))
    }

    /// Typed [`update_bytes`](Self::update_bytes)
    pub fn update<T: Message>(&mut self, dst: &mut T) -> Result<bool> {
        self.check_type::<T>()?;
        self.update_bytes(as_bytes_mut(dst))
    }

    /// Typed [`update_queued_bytes`](Self::update_queued_bytes)
    pub fn update_queued<T: Message>(&mut self, dst: &mut T) -> Result<bool> {
        self.check_type::<T>()?;
        self.update_queued_bytes(as_bytes_mut(dst))
    }

    /// Minimum spacing between deliveries, 0 disables throttling
    pub fn set_interval_us(&mut self, interval_us: u32) {
        self.gate.set_interval_us(interval_us);
    }

    pub fn get_interval_us(&self) -> u32 {
        self.gate.interval_us()
    }

    pub fn set_interval_ms(&mut self, interval_ms: u32) {
        self.set_interval_us(interval_ms.saturating_mul(1000));
    }

    pub fn get_interval_ms(&self) -> u32 {
        self.get_interval_us() / 1000
    }

    /// Signal `target` on every publish that passes the interval.
    ///
    /// Creates the node if no producer exists yet, so the callback is in
    /// place when one appears. Pending data does not fire the callback.
    pub fn register_callback(&mut self, target: WakeTarget) -> Result<CallbackId> {
        let id = self
            .callback
            .as_ref()
            .map_or_else(next_callback_id, |(id, _)| *id);
        let node = self.bind_or_create()?;
        node.register_callback(id, target.clone(), Some(self.gate.clone()));
        self.callback = Some((id, target));
        Ok(id)
    }

    pub fn unregister_callback(&mut self) {
        if let Some((id, _)) = self.callback.take() {
            if let Some(node) = &self.node {
                node.unregister_callback(id);
            }
        }
    }

    pub fn callback_registered(&self) -> bool {
        self.callback.is_some()
    }

    /// Temporary wake registration used by multi-wait
    pub(crate) fn attach_waker(&mut self, target: WakeTarget) -> Result<CallbackId> {
        let node = self.bind_or_create()?;
        let id = next_callback_id();
        node.register_callback(id, target, Some(self.gate.clone()));
        Ok(id)
    }

    pub(crate) fn detach_waker(&self, id: CallbackId) {
        if let Some(node) = &self.node {
            node.unregister_callback(id);
        }
    }

    /// Time until a pending sample clears the interval, if one is held back
    pub(crate) fn throttle_remaining(&mut self) -> Option<Duration> {
        if self.gate.interval_us() == 0 || self.updates_available() == 0 {
            return None;
        }
        match self.gate.remaining_us(time::absolute_time_us()) {
            0 => None,
            remaining => Some(Duration::from_micros(remaining)),
        }
    }

    /// Move to another instance of the same topic if that node exists.
    ///
    /// A registered callback moves along.
    pub fn change_instance(&mut self, instance: u8) -> bool {
        if instance == self.instance && self.node.is_some() {
            return true;
        }
        if !self.registry.node_exists(self.meta.id, instance) {
            return false;
        }
        self.detach();
        self.instance = instance;
        self.bind(StartAt::Current)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Subscription that keeps the last received record
#[derive(Debug)]
pub struct SubscriptionData<T: Message> {
    subscription: Subscription,
    data: T,
}

impl<T: Message> SubscriptionData<T> {
    /// Subscribe to `instance` and load whatever the node holds
    pub fn new(broker: &Broker, instance: u8) -> Self {
        let mut subscription = broker.subscribe_multi(T::metadata(), instance);
        let mut data = T::default();
        // nothing published yet is fine: data stays at its default
        let _ = subscription.copy(&mut data);
        Self { subscription, data }
    }

    /// Pull a newer record if there is one
    pub fn update(&mut self) -> bool {
        matches!(self.subscription.update(&mut self.data), Ok(true))
    }

    pub fn get(&self) -> &T {
        &self.data
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn subscription_mut(&mut self) -> &mut Subscription {
        &mut self.subscription
    }
}

/// One subscription per instance of a topic
#[derive(Debug)]
pub struct SubscriptionMultiArray<T: Message> {
    subscriptions: Vec<Subscription>,
    _marker: PhantomData<T>,
}

impl<T: Message> SubscriptionMultiArray<T> {
    /// Subscribe to every instance the broker supports
    pub fn new(broker: &Broker) -> Self {
        let subscriptions = (0..broker.config().max_instances as u8)
            .map(|instance| broker.subscribe_multi(T::metadata(), instance))
            .collect();
        Self {
            subscriptions,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Whether instance `index` is advertised
    pub fn advertised(&mut self, index: usize) -> bool {
        self.subscriptions
            .get_mut(index)
            .is_some_and(Subscription::advertised)
    }

    /// Number of advertised instances
    pub fn advertised_count(&mut self) -> usize {
        self.subscriptions
            .iter_mut()
            .map(Subscription::advertised)
            .filter(|&advertised| advertised)
            .count()
    }

    /// Whether any instance has a new sample
    pub fn updated(&mut self) -> bool {
        self.subscriptions.iter_mut().any(Subscription::updated)
    }

    /// Update from one instance
    pub fn update(&mut self, index: usize, dst: &mut T) -> Result<bool> {
        match self.subscriptions.get_mut(index) {
            Some(subscription) => subscription.update(dst),
            None => Err(BusError::invalid_parameter(
                "index",
                format!("{} >= {}", index, self.subscriptions.len()),
            )),
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Subscription> {
        self.subscriptions.get_mut(index)
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Subscription> {
        self.subscriptions.iter_mut()
    }
}

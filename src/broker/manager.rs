//! The broker: call surface used by every subsystem

use std::{sync::Arc, time::Duration};

use lazy_static::lazy_static;

use crate::error::{BusError, Result};
use crate::topic::{format_message, TopicId, TopicMetadata};

use super::{
    blocking::{self, WakeReason},
    config::BrokerConfig,
    publication::PublicationHandle,
    registry::{InstanceRequest, Registry},
    stats::{BrokerStats, NodeStatus},
    subscription::Subscription,
};

lazy_static! {
    static ref GLOBAL_BROKER: Broker = Broker::default();
}

/// Handle to a bus instance; clones share the same registry
#[derive(Debug, Clone, Default)]
pub struct Broker {
    registry: Arc<Registry>,
}

impl Broker {
    /// Create an independent bus
    pub fn new(config: BrokerConfig) -> Result<Self> {
        Ok(Self {
            registry: Arc::new(Registry::new(config)?),
        })
    }

    /// The process-wide bus
    pub fn global() -> &'static Broker {
        &GLOBAL_BROKER
    }

    pub fn config(&self) -> &BrokerConfig {
        self.registry.config()
    }

    pub fn stats(&self) -> &BrokerStats {
        self.registry.stats()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub(crate) fn advertise_with(
        &self,
        meta: &'static TopicMetadata,
        request: InstanceRequest,
        queue_size: usize,
        data: Option<&[u8]>,
    ) -> Result<PublicationHandle> {
        if let Some(data) = data {
            if data.len() != meta.size {
                return Err(BusError::invalid_parameter(
                    "data",
                    format!("{} expects {} bytes, got {}", meta.name, meta.size, data.len()),
                ));
            }
        }

        let node = self.registry.advertise(meta, request, queue_size)?;
        // from here on the handle owns the producer reference
        let handle = PublicationHandle::new(self.registry.clone(), node);

        if let Some(data) = data {
            if let Err(e) = handle.publish(meta, data) {
                self.registry.stats().record_advertise_failure();
                handle.unadvertise();
                return Err(e);
            }
        }
        Ok(handle)
    }

    /// Advertise instance 0, optionally publishing an initial sample
    pub fn advertise(
        &self,
        meta: &'static TopicMetadata,
        data: Option<&[u8]>,
    ) -> Result<PublicationHandle> {
        self.advertise_with(meta, InstanceRequest::Shared, 1, data)
    }

    /// Advertise instance 0 with a queue of `queue_size` samples
    pub fn advertise_queue(
        &self,
        meta: &'static TopicMetadata,
        data: Option<&[u8]>,
        queue_size: usize,
    ) -> Result<PublicationHandle> {
        self.advertise_with(meta, InstanceRequest::Shared, queue_size, data)
    }

    /// Advertise the first free instance, reporting it through `instance`
    pub fn advertise_multi(
        &self,
        meta: &'static TopicMetadata,
        data: Option<&[u8]>,
        instance: &mut u8,
    ) -> Result<PublicationHandle> {
        self.advertise_multi_queue(meta, data, instance, 1)
    }

    /// [`advertise_multi`](Self::advertise_multi) with a queue
    pub fn advertise_multi_queue(
        &self,
        meta: &'static TopicMetadata,
        data: Option<&[u8]>,
        instance: &mut u8,
        queue_size: usize,
    ) -> Result<PublicationHandle> {
        let handle = self.advertise_with(meta, InstanceRequest::NextFree, queue_size, data)?;
        *instance = handle.instance();
        Ok(handle)
    }

    /// Give up a producer role
    pub fn unadvertise(&self, handle: PublicationHandle) {
        handle.unadvertise();
    }

    /// Publish through `handle`; `meta` must match the bound topic
    pub fn publish(
        &self,
        meta: &TopicMetadata,
        handle: &PublicationHandle,
        data: &[u8],
    ) -> Result<()> {
        handle.publish(meta, data)
    }

    /// Publish, advertising a new instance on first use
    pub fn publish_auto(
        &self,
        meta: &'static TopicMetadata,
        handle: &mut Option<PublicationHandle>,
        data: &[u8],
        instance: &mut u8,
    ) -> Result<()> {
        if let Some(existing) = handle.as_ref() {
            return existing.publish(meta, data);
        }
        *handle = Some(self.advertise_multi(meta, Some(data), instance)?);
        Ok(())
    }

    /// Subscribe to instance 0
    pub fn subscribe(&self, meta: &'static TopicMetadata) -> Subscription {
        self.subscribe_multi(meta, 0)
    }

    /// Subscribe to one instance; succeeds before the topic is advertised
    pub fn subscribe_multi(&self, meta: &'static TopicMetadata, instance: u8) -> Subscription {
        Subscription::new(self.registry.clone(), meta, instance)
    }

    /// Release a subscription
    pub fn unsubscribe(&self, mut subscription: Subscription) {
        subscription.unsubscribe();
    }

    /// Whether new data is available
    pub fn check(&self, subscription: &mut Subscription) -> bool {
        subscription.updated()
    }

    /// Copy the newest sample; `meta` must match the subscribed topic
    pub fn copy(
        &self,
        meta: &TopicMetadata,
        subscription: &mut Subscription,
        buffer: &mut [u8],
    ) -> Result<()> {
        if !subscription.meta().same_topic(meta) {
            return Err(BusError::type_mismatch(subscription.meta().name, meta.name));
        }
        subscription.copy_bytes(buffer)
    }

    /// Copy only if new data is available
    pub fn update(&self, subscription: &mut Subscription, buffer: &mut [u8]) -> Result<bool> {
        subscription.update_bytes(buffer)
    }

    pub fn set_interval(&self, subscription: &mut Subscription, interval_ms: u32) {
        subscription.set_interval_ms(interval_ms);
    }

    pub fn get_interval(&self, subscription: &Subscription) -> u32 {
        subscription.get_interval_ms()
    }

    /// Whether `instance` exists and is advertised
    pub fn exists(&self, meta: &TopicMetadata, instance: u8) -> bool {
        self.registry.exists(meta, instance)
    }

    /// Number of advertised instances of `meta`
    pub fn group_count(&self, meta: &TopicMetadata) -> usize {
        self.registry.group_count(meta)
    }

    /// Whether a node exists, whether or not it is advertised
    pub fn node_exists(&self, id: TopicId, instance: u8) -> bool {
        self.registry.node_exists(id, instance)
    }

    /// Block until one of `subscriptions` has data or `timeout` elapses
    pub fn poll(
        &self,
        subscriptions: &mut [&mut Subscription],
        timeout: Duration,
    ) -> Result<WakeReason> {
        blocking::poll(subscriptions, timeout)
    }

    /// Status of every live node
    pub fn status(&self) -> Vec<NodeStatus> {
        self.registry.status()
    }

    /// Render a record of `meta` as text
    pub fn format_message(&self, meta: &TopicMetadata, data: &[u8]) -> Result<String> {
        format_message(meta, data)
    }

    /// Render the newest sample of a live node
    pub fn print_latest(&self, name: &str, instance: u8) -> Result<String> {
        let node = self
            .registry
            .find_by_name(name, instance)
            .ok_or_else(|| BusError::not_advertised(name, instance))?;

        let mut buffer = vec![0u8; node.meta().size];
        match node.read(&mut buffer)? {
            Some(_) => format_message(node.meta(), &buffer),
            None => Err(BusError::not_advertised(name, instance)),
        }
    }
}

//! Publisher handles

use std::{marker::PhantomData, sync::Arc};

use crate::error::{BusError, Result};
use crate::topic::{as_bytes, Message, TopicMetadata};

use super::{
    manager::Broker,
    node::DeviceNode,
    registry::{InstanceRequest, Registry},
};

/// Producer capability for one node
///
/// Dropping the handle releases the producer reference. Single-slot nodes
/// are unadvertised at that point, queued nodes stay advertised so late
/// subscribers can still drain them. [`PublicationHandle::unadvertise`]
/// always unadvertises.
#[derive(Debug)]
pub struct PublicationHandle {
    registry: Arc<Registry>,
    node: Arc<DeviceNode>,
    unadvertise_on_drop: bool,
}

impl PublicationHandle {
    pub(crate) fn new(registry: Arc<Registry>, node: Arc<DeviceNode>) -> Self {
        Self {
            registry,
            node,
            unadvertise_on_drop: false,
        }
    }

    /// Topic this handle publishes
    pub fn meta(&self) -> &'static TopicMetadata {
        self.node.meta()
    }

    /// Instance this handle publishes
    pub fn instance(&self) -> u8 {
        self.node.instance()
    }

    pub fn queue_size(&self) -> usize {
        self.node.queue_size()
    }

    pub fn node(&self) -> &Arc<DeviceNode> {
        &self.node
    }

    /// Publish a raw record; `meta` must describe the bound topic
    pub fn publish(&self, meta: &TopicMetadata, data: &[u8]) -> Result<()> {
        if !self.node.meta().same_topic(meta) {
            return Err(BusError::type_mismatch(self.node.name(), meta.name));
        }
        self.node.write(data)?;
        self.registry.stats().record_publish();
        Ok(())
    }

    /// Publish a typed record
    pub fn publish_message<T: Message>(&self, msg: &T) -> Result<()> {
        self.publish(T::metadata(), as_bytes(msg))
    }

    /// Give up the producer role
    pub fn unadvertise(mut self) {
        self.unadvertise_on_drop = true;
    }
}

impl Drop for PublicationHandle {
    fn drop(&mut self) {
        let unadvertise = self.unadvertise_on_drop || self.node.queue_size() == 1;
        self.registry.release_publisher(&self.node, unadvertise);
    }
}

/// Typed publication that advertises on first publish
#[derive(Debug)]
pub struct Publication<T: Message> {
    broker: Broker,
    request: InstanceRequest,
    handle: Option<PublicationHandle>,
    _marker: PhantomData<T>,
}

impl<T: Message> Publication<T> {
    /// Publication on the shared instance 0
    pub fn new(broker: &Broker) -> Self {
        Self::with_request(broker, InstanceRequest::Shared)
    }

    /// Publication on a fresh instance, picked at advertise time
    pub fn new_multi(broker: &Broker) -> Self {
        Self::with_request(broker, InstanceRequest::NextFree)
    }

    fn with_request(broker: &Broker, request: InstanceRequest) -> Self {
        Self {
            broker: broker.clone(),
            request,
            handle: None,
            _marker: PhantomData,
        }
    }

    /// Advertise now instead of on first publish
    pub fn advertise(&mut self) -> Result<()> {
        if self.handle.is_none() {
            let handle = self.broker.advertise_with(
                T::metadata(),
                self.request,
                T::QUEUE_LENGTH as usize,
                None,
            )?;
            self.handle = Some(handle);
        }
        Ok(())
    }

    pub fn advertised(&self) -> bool {
        self.handle.is_some()
    }

    /// Publish, advertising first if needed
    pub fn publish(&mut self, msg: &T) -> Result<()> {
        self.advertise()?;
        match &self.handle {
            Some(handle) => handle.publish_message(msg),
            None => Err(BusError::not_advertised(T::metadata().name, 0)),
        }
    }

    /// Instance this publication owns, once advertised
    pub fn get_instance(&self) -> Option<u8> {
        self.handle.as_ref().map(PublicationHandle::instance)
    }

    pub fn handle(&self) -> Option<&PublicationHandle> {
        self.handle.as_ref()
    }

    pub fn unadvertise(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.unadvertise();
        }
    }
}

/// Publication that keeps a working copy of the record
#[derive(Debug)]
pub struct PublicationData<T: Message> {
    publication: Publication<T>,
    data: T,
}

impl<T: Message> PublicationData<T> {
    pub fn new(broker: &Broker) -> Self {
        Self {
            publication: Publication::new(broker),
            data: T::default(),
        }
    }

    pub fn new_multi(broker: &Broker) -> Self {
        Self {
            publication: Publication::new_multi(broker),
            data: T::default(),
        }
    }

    pub fn get(&self) -> &T {
        &self.data
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.data
    }

    pub fn set(&mut self, data: T) {
        self.data = data;
    }

    /// Publish the working copy
    pub fn update(&mut self) -> Result<()> {
        let data = self.data;
        self.publication.publish(&data)
    }

    /// Replace the working copy and publish it
    pub fn update_with(&mut self, data: T) -> Result<()> {
        self.data = data;
        self.update()
    }

    pub fn publication(&self) -> &Publication<T> {
        &self.publication
    }

    pub fn publication_mut(&mut self) -> &mut Publication<T> {
        &mut self.publication
    }
}

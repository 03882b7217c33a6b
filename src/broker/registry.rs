//! Directory of live device nodes
//!
//! Nodes live in a fixed table indexed by `topic_id * max_instances +
//! instance`. A bitset mirrors which slots are occupied so existence checks
//! never take the directory lock. A node leaves the table once it has no
//! producer, no subscriber and no callback.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;

use crate::error::{BusError, Result};
use crate::topic::{TopicId, TopicMetadata};

use super::{
    config::BrokerConfig,
    node::{round_queue_size, DeviceNode},
    stats::{BrokerStats, NodeStatus},
};

/// How advertise picks an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InstanceRequest {
    /// Instance 0, shared with any other producer
    Shared,
    /// First instance that is absent or not advertised
    NextFree,
}

#[derive(Debug)]
struct ExistenceBits {
    words: Box<[AtomicU64]>,
}

impl ExistenceBits {
    fn new(bits: usize) -> Self {
        Self {
            words: (0..(bits + 63) / 64).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn set(&self, bit: usize) {
        self.words[bit / 64].fetch_or(1 << (bit % 64), Ordering::Release);
    }

    fn clear(&self, bit: usize) {
        self.words[bit / 64].fetch_and(!(1 << (bit % 64)), Ordering::Release);
    }

    fn test(&self, bit: usize) -> bool {
        self.words[bit / 64].load(Ordering::Acquire) & (1 << (bit % 64)) != 0
    }
}

#[derive(Debug)]
struct Directory {
    slots: Vec<Option<Arc<DeviceNode>>>,
    /// Name index, one inner map of instances per topic name
    by_name: BTreeMap<&'static str, BTreeMap<u8, Arc<DeviceNode>>>,
}

/// Process-wide directory mapping (topic, instance) to nodes
#[derive(Debug)]
pub struct Registry {
    config: BrokerConfig,
    directory: RwLock<Directory>,
    existence: ExistenceBits,
    stats: BrokerStats,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_config(BrokerConfig::default())
    }
}

impl Registry {
    /// Create a registry sized by `config`
    pub fn new(config: BrokerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: BrokerConfig) -> Self {
        let slots = config.slot_count();
        Self {
            directory: RwLock::new(Directory {
                slots: vec![None; slots],
                by_name: BTreeMap::new(),
            }),
            existence: ExistenceBits::new(slots),
            stats: BrokerStats::new(),
            config,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn stats(&self) -> &BrokerStats {
        &self.stats
    }

    fn slot_index(&self, meta: &TopicMetadata, instance: u8) -> Result<usize> {
        let id = meta.id as usize;
        if id >= self.config.max_topics {
            return Err(BusError::invalid_parameter(
                "topic id",
                format!("{} has id {}, table holds {}", meta.name, id, self.config.max_topics),
            ));
        }
        if instance as usize >= self.config.max_instances {
            return Err(BusError::invalid_parameter(
                "instance",
                format!("{} instance {} >= {}", meta.name, instance, self.config.max_instances),
            ));
        }
        Ok(id * self.config.max_instances + instance as usize)
    }

    fn check_topic(node: &DeviceNode, meta: &TopicMetadata) -> Result<()> {
        if node.meta().same_topic(meta) {
            Ok(())
        } else {
            log::warn!("topic id {} bound to {}, requested as {}", meta.id, node.name(), meta.name);
            Err(BusError::type_mismatch(node.name(), meta.name))
        }
    }

    /// O(1) check whether a node exists, advertised or not
    pub fn node_exists(&self, id: TopicId, instance: u8) -> bool {
        let id = id as usize;
        let instance = instance as usize;
        if id >= self.config.max_topics || instance >= self.config.max_instances {
            return false;
        }
        self.existence.test(id * self.config.max_instances + instance)
    }

    /// Resolve a node, `Ok(None)` if it does not exist
    pub fn get(&self, meta: &TopicMetadata, instance: u8) -> Result<Option<Arc<DeviceNode>>> {
        let index = self.slot_index(meta, instance)?;
        if !self.existence.test(index) {
            return Ok(None);
        }

        let directory = self.directory.read();
        match &directory.slots[index] {
            Some(node) => {
                Self::check_topic(node, meta)?;
                Ok(Some(node.clone()))
            }
            None => Ok(None),
        }
    }

    /// Whether the instance exists and is advertised
    pub fn exists(&self, meta: &TopicMetadata, instance: u8) -> bool {
        matches!(self.get(meta, instance), Ok(Some(node)) if node.is_advertised())
    }

    /// Number of consecutive advertised instances starting at 0
    pub fn group_count(&self, meta: &TopicMetadata) -> usize {
        (0..self.config.max_instances)
            .take_while(|&instance| self.exists(meta, instance as u8))
            .count()
    }

    fn insert_node(
        &self,
        directory: &mut Directory,
        meta: &'static TopicMetadata,
        instance: u8,
        index: usize,
        queue_size: usize,
    ) -> Arc<DeviceNode> {
        let node = Arc::new(DeviceNode::new(meta, instance, queue_size));
        directory.slots[index] = Some(node.clone());
        directory
            .by_name
            .entry(meta.name)
            .or_default()
            .insert(instance, node.clone());
        self.existence.set(index);
        self.stats.record_node_created();
        log::debug!("created node {}/{} (queue {})", meta.name, instance, node.queue_size());
        node
    }

    /// Bind a new producer to a node, creating it if needed
    pub(crate) fn advertise(
        &self,
        meta: &'static TopicMetadata,
        request: InstanceRequest,
        queue_size: usize,
    ) -> Result<Arc<DeviceNode>> {
        let result = self.advertise_locked(meta, request, queue_size);
        if result.is_err() {
            self.stats.record_advertise_failure();
        }
        result
    }

    fn advertise_locked(
        &self,
        meta: &'static TopicMetadata,
        request: InstanceRequest,
        queue_size: usize,
    ) -> Result<Arc<DeviceNode>> {
        let mut directory = self.directory.write();

        let node = match request {
            InstanceRequest::Shared => {
                let index = self.slot_index(meta, 0)?;
                match directory.slots[index].clone() {
                    Some(node) => {
                        Self::check_topic(&node, meta)?;
                        node
                    }
                    None => self.insert_node(&mut directory, meta, 0, index, queue_size),
                }
            }
            InstanceRequest::NextFree => {
                let mut chosen = None;
                for instance in 0..self.config.max_instances as u8 {
                    let index = self.slot_index(meta, instance)?;
                    match directory.slots[index].clone() {
                        Some(node) => {
                            Self::check_topic(&node, meta)?;
                            if !node.is_advertised() {
                                chosen = Some(node);
                                break;
                            }
                        }
                        None => {
                            chosen = Some(self.insert_node(
                                &mut directory,
                                meta,
                                instance,
                                index,
                                queue_size,
                            ));
                            break;
                        }
                    }
                }
                chosen.ok_or_else(|| {
                    log::warn!("{}: all {} instances taken", meta.name, self.config.max_instances);
                    BusError::instance_exhausted(meta.name, self.config.max_instances)
                })?
            }
        };

        if round_queue_size(queue_size) > node.queue_size() {
            if let Err(e) = node.update_queue_size(queue_size) {
                log::warn!("{}/{}: {}", meta.name, node.instance(), e);
            }
        }
        node.add_publisher();
        Ok(node)
    }

    /// Register a subscriber on an existing node
    pub(crate) fn attach_subscriber(
        &self,
        meta: &TopicMetadata,
        instance: u8,
    ) -> Result<Option<Arc<DeviceNode>>> {
        let index = self.slot_index(meta, instance)?;
        if !self.existence.test(index) {
            return Ok(None);
        }

        let directory = self.directory.read();
        let Some(node) = directory.slots[index].clone() else {
            return Ok(None);
        };
        Self::check_topic(&node, meta)?;
        node.add_internal_subscriber();
        Ok(Some(node))
    }

    /// Register a subscriber, creating an unadvertised node if needed
    pub(crate) fn attach_subscriber_or_create(
        &self,
        meta: &'static TopicMetadata,
        instance: u8,
    ) -> Result<Arc<DeviceNode>> {
        if let Some(node) = self.attach_subscriber(meta, instance)? {
            return Ok(node);
        }

        let index = self.slot_index(meta, instance)?;
        let mut directory = self.directory.write();
        let node = match directory.slots[index].clone() {
            Some(node) => {
                Self::check_topic(&node, meta)?;
                node
            }
            None => self.insert_node(&mut directory, meta, instance, index, 1),
        };
        node.add_internal_subscriber();
        Ok(node)
    }

    pub(crate) fn release_subscriber(&self, node: &Arc<DeviceNode>) {
        let mut directory = self.directory.write();
        node.remove_internal_subscriber();
        self.reclaim_if_unused(&mut directory, node);
    }

    pub(crate) fn release_publisher(&self, node: &Arc<DeviceNode>, unadvertise: bool) {
        let mut directory = self.directory.write();
        node.remove_publisher(unadvertise);
        self.reclaim_if_unused(&mut directory, node);
    }

    fn reclaim_if_unused(&self, directory: &mut Directory, node: &Arc<DeviceNode>) {
        if !node.is_reclaimable() {
            return;
        }
        let Ok(index) = self.slot_index(node.meta(), node.instance()) else {
            return;
        };

        let is_current = directory.slots[index]
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, node));
        if is_current {
            directory.slots[index] = None;
            if let Some(instances) = directory.by_name.get_mut(node.name()) {
                instances.remove(&node.instance());
                if instances.is_empty() {
                    directory.by_name.remove(node.name());
                }
            }
            self.existence.clear(index);
            self.stats.record_node_reclaimed();
            log::debug!("reclaimed node {}/{}", node.name(), node.instance());
        }
    }

    /// All live nodes sorted by (name, instance)
    pub fn nodes(&self) -> Vec<Arc<DeviceNode>> {
        self.directory
            .read()
            .by_name
            .values()
            .flat_map(|instances| instances.values().cloned())
            .collect()
    }

    /// Look up a live node by topic name
    pub fn find_by_name(&self, name: &str, instance: u8) -> Option<Arc<DeviceNode>> {
        self.directory
            .read()
            .by_name
            .get(name)
            .and_then(|instances| instances.get(&instance))
            .cloned()
    }

    /// Status of every live node sorted by (name, instance)
    pub fn status(&self) -> Vec<NodeStatus> {
        self.nodes().iter().map(|node| node.status()).collect()
    }
}

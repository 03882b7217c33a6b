//! Broker statistics and node status snapshots

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use crate::topic::TopicId;

/// Global broker statistics
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// Total nodes created
    pub nodes_created: AtomicU64,
    /// Total nodes reclaimed
    pub nodes_reclaimed: AtomicU64,
    /// Advertise calls that returned no handle
    pub advertise_failures: AtomicU64,
    /// Samples published across all nodes
    pub publications: AtomicU64,
    /// Samples copied out by subscribers
    pub copies: AtomicU64,
}

impl BrokerStats {
    /// Create new statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes (created - reclaimed)
    pub fn active_nodes(&self) -> u64 {
        let created = self.nodes_created.load(Ordering::Relaxed);
        let reclaimed = self.nodes_reclaimed.load(Ordering::Relaxed);
        created.saturating_sub(reclaimed)
    }

    pub fn total_publications(&self) -> u64 {
        self.publications.load(Ordering::Relaxed)
    }

    pub fn total_copies(&self) -> u64 {
        self.copies.load(Ordering::Relaxed)
    }

    pub(crate) fn record_node_created(&self) {
        self.nodes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_node_reclaimed(&self) {
        self.nodes_reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_advertise_failure(&self) {
        self.advertise_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_publish(&self) {
        self.publications.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_copy(&self) {
        self.copies.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub name: &'static str,
    pub topic_id: TopicId,
    pub instance: u8,
    pub size: usize,
    pub queue_size: usize,
    pub generation: u32,
    pub subscribers: u32,
    pub publishers: u32,
    pub callbacks: usize,
    pub advertised: bool,
}

impl NodeStatus {
    /// Same (topic, instance) as `other`
    pub fn same_node(&self, other: &NodeStatus) -> bool {
        self.topic_id == other.topic_id && self.instance == other.instance
    }

    /// Publish rate between an earlier snapshot of this node and this one
    pub fn publish_rate_hz(&self, earlier: &NodeStatus, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 || !self.same_node(earlier) {
            return 0.0;
        }
        self.generation.wrapping_sub(earlier.generation) as f64 / secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(generation: u32) -> NodeStatus {
        NodeStatus {
            name: "sensor_accel",
            topic_id: 8,
            instance: 0,
            size: 40,
            queue_size: 1,
            generation,
            subscribers: 1,
            publishers: 1,
            callbacks: 0,
            advertised: true,
        }
    }

    #[test]
    fn test_active_nodes() {
        let stats = BrokerStats::new();
        stats.record_node_created();
        stats.record_node_created();
        stats.record_node_reclaimed();
        assert_eq!(stats.active_nodes(), 1);
    }

    #[test]
    fn test_publish_rate() {
        let earlier = status(100);
        let later = status(350);
        let rate = later.publish_rate_hz(&earlier, Duration::from_millis(500));
        assert!((rate - 500.0).abs() < 1e-9);

        // counter wrapped between samples
        let rate = status(4).publish_rate_hz(&status(u32::MAX - 5), Duration::from_secs(1));
        assert!((rate - 10.0).abs() < 1e-9);

        assert_eq!(later.publish_rate_hz(&earlier, Duration::ZERO), 0.0);
    }
}

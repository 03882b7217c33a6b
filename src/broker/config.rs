//! Broker sizing configuration

use crate::config::{DEFAULT_MAX_TOPICS, MAX_INSTANCES, MAX_TOPICS_LIMIT};
use crate::error::{BusError, Result};

/// Sizing of the registry table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Number of topic ids the registry reserves slots for
    pub max_topics: usize,
    /// Number of parallel instances per topic
    pub max_instances: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_topics: DEFAULT_MAX_TOPICS,
            max_instances: MAX_INSTANCES,
        }
    }
}

impl BrokerConfig {
    /// Set the number of topic ids
    pub fn with_max_topics(mut self, max_topics: usize) -> Self {
        self.max_topics = max_topics;
        self
    }

    /// Set the number of instances per topic
    pub fn with_max_instances(mut self, max_instances: usize) -> Self {
        self.max_instances = max_instances;
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.max_topics == 0 || self.max_topics > MAX_TOPICS_LIMIT {
            return Err(BusError::invalid_parameter(
                "max_topics",
                format!("must be in 1..={}, got {}", MAX_TOPICS_LIMIT, self.max_topics),
            ));
        }
        if self.max_instances == 0 || self.max_instances > MAX_INSTANCES {
            return Err(BusError::invalid_parameter(
                "max_instances",
                format!("must be in 1..={}, got {}", MAX_INSTANCES, self.max_instances),
            ));
        }
        Ok(())
    }

    /// Total number of registry slots
    pub fn slot_count(&self) -> usize {
        self.max_topics * self.max_instances
    }
}

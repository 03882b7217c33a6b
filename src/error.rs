//! Error types and handling for skybus

use crate::sync::SyncError;

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Error taxonomy of the bus
///
/// `NotAdvertised` and `Unbound` are routine: they mean "no data yet" and
/// callers are expected to carry on. See [`BusError::is_no_data`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// Sample storage for a node could not be allocated
    #[error("Allocation failed for {topic}: {message}")]
    AllocationFailure { topic: String, message: String },

    /// The topic instance has no active producer
    #[error("Topic not advertised: {topic} instance {instance}")]
    NotAdvertised { topic: String, instance: u8 },

    /// The subscription has not found its node yet
    #[error("Subscription not bound: {topic} instance {instance}")]
    Unbound { topic: String, instance: u8 },

    /// Caller-supplied metadata differs from the topic the handle is bound to
    #[error("Type mismatch: bound to {bound}, caller supplied {supplied}")]
    TypeMismatch { bound: String, supplied: String },

    /// Every instance slot of a topic is taken by an active producer
    #[error("No free instance for {topic} (max {max_instances})")]
    InstanceExhausted { topic: String, max_instances: usize },

    /// Queue size change requested after data started flowing
    #[error("Queue size of {topic} is fixed at {current} (requested {requested})")]
    QueueSizeLocked {
        topic: String,
        current: usize,
        requested: usize,
    },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Wake primitive failure
    #[error("Notification error: {message}")]
    Notification { message: String },
}

impl BusError {
    /// Create an allocation failure error
    pub fn allocation_failure(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AllocationFailure {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a not advertised error
    pub fn not_advertised(topic: impl Into<String>, instance: u8) -> Self {
        Self::NotAdvertised {
            topic: topic.into(),
            instance,
        }
    }

    /// Create an unbound subscription error
    pub fn unbound(topic: impl Into<String>, instance: u8) -> Self {
        Self::Unbound {
            topic: topic.into(),
            instance,
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(bound: impl Into<String>, supplied: impl Into<String>) -> Self {
        Self::TypeMismatch {
            bound: bound.into(),
            supplied: supplied.into(),
        }
    }

    /// Create an instance exhausted error
    pub fn instance_exhausted(topic: impl Into<String>, max_instances: usize) -> Self {
        Self::InstanceExhausted {
            topic: topic.into(),
            max_instances,
        }
    }

    /// Create a queue size locked error
    pub fn queue_size_locked(topic: impl Into<String>, current: usize, requested: usize) -> Self {
        Self::QueueSizeLocked {
            topic: topic.into(),
            current,
            requested,
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a notification error
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }

    /// True for the routine "nothing to read yet" outcomes
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NotAdvertised { .. } | Self::Unbound { .. })
    }
}

impl From<SyncError> for BusError {
    fn from(err: SyncError) -> Self {
        Self::notification(err.to_string())
    }
}

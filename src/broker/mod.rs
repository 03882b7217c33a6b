//! Publish/subscribe broker
//!
//! Producers advertise a (topic, instance) and get a [`PublicationHandle`];
//! consumers subscribe and get a [`Subscription`] with a private cursor.
//! Both meet at a [`DeviceNode`], which the [`Registry`] keeps in a fixed
//! table until its last producer and subscriber are gone.

pub mod blocking;
pub mod callbacks;
pub mod config;
pub mod manager;
pub mod node;
pub mod publication;
pub mod registry;
pub mod stats;
pub mod subscription;

pub use blocking::{poll, WakeReason};
pub use callbacks::{CallbackId, IntervalGate, WakeEvent, WakeTarget};
pub use config::BrokerConfig;
pub use manager::Broker;
pub use node::{round_queue_size, DeviceNode};
pub use publication::{Publication, PublicationData, PublicationHandle};
pub use registry::Registry;
pub use stats::{BrokerStats, NodeStatus};
pub use subscription::{Subscription, SubscriptionData, SubscriptionMultiArray};

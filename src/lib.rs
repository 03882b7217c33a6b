//! # skybus - In-Process Publish/Subscribe Object Broker
//!
//! skybus connects the tasks of a flight-control stack (estimators,
//! controllers, drivers, state machines) through fixed-layout topics. Each
//! subsystem only talks to the others through the bus.
//!
//! ## Features
//!
//! - **Fixed-layout topics**: `#[repr(C)]` records moved by plain byte copies
//! - **Multi-instance topics**: up to 10 parallel streams per topic for redundant sensors
//! - **Independent cursors**: every subscriber reads at its own pace, lossy on overrun
//! - **Lock-light reads**: `updated()` is a single atomic load
//! - **Throttling**: per-subscription minimum delivery interval
//! - **Blocking multi-wait**: eventfd-backed `poll` with a mandatory timeout
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  advertise/publish  ┌───────────────────────────────┐
//! │ Publication  │ ──────────────────▶ │ DeviceNode (topic, instance)  │
//! └──────────────┘                     │ - ring of queue_size samples  │
//!                                      │ - generation counter          │
//! ┌──────────────┐  copy/update        │ - subscriber count            │
//! │ Subscription │ ◀────────────────── │ - wake targets                │
//! │ - cursor     │                     └───────────────────────────────┘
//! │ - interval   │                                    ▲
//! └──────────────┘                                    │
//!         │ poll                       ┌───────────────────────────────┐
//!         ▼                            │ Registry                      │
//! ┌──────────────┐                     │ - slot table [id][instance]   │
//! │ EventNotifier│                     │ - existence bitset            │
//! └──────────────┘                     └───────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use skybus::{topics::SensorTemperature, Broker, BrokerConfig, Publication};
//!
//! let broker = Broker::new(BrokerConfig::default()).unwrap();
//! let mut subscription = broker.subscribe(&SensorTemperature::METADATA);
//!
//! let mut publication = Publication::<SensorTemperature>::new(&broker);
//! publication
//!     .publish(&SensorTemperature { temperature: 25.0, ..Default::default() })
//!     .unwrap();
//!
//! let mut reading = SensorTemperature::default();
//! assert!(subscription.update(&mut reading).unwrap());
//! assert_eq!(reading.temperature, 25.0);
//! ```

pub mod broker;
pub mod error;
pub mod sync;
pub mod time;
pub mod topic;
pub mod topics;

// Main API re-exports
pub use broker::{
    poll, Broker, BrokerConfig, BrokerStats, CallbackId, DeviceNode, NodeStatus, Publication,
    PublicationData, PublicationHandle, Registry, Subscription, SubscriptionData,
    SubscriptionMultiArray, WakeEvent, WakeReason, WakeTarget,
};
pub use error::{BusError, Result};
pub use sync::{EventNotifier, SyncError, SyncResult};
pub use topic::{Message, Plain, TopicId, TopicMetadata};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Default configuration constants
pub mod config {
    /// Maximum number of parallel instances of one topic
    pub const MAX_INSTANCES: usize = 10;

    /// Default number of topic ids a registry reserves slots for
    pub const DEFAULT_MAX_TOPICS: usize = 256;

    /// Upper bound for the registry's topic id range
    pub const MAX_TOPICS_LIMIT: usize = 1 << 16;

    /// Largest queue a node can hold
    pub const MAX_QUEUE_SIZE: usize = 128;
}

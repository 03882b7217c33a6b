//! Synchronization primitives for the bus
//!
//! Key features:
//! - Generation counters with release/acquire publication ordering
//! - eventfd-based wake objects that never block the signalling side

pub mod generation;
pub mod notify;

pub use generation::{backlog, Generation, GenerationNumber, MAX_BACKLOG};
pub use notify::{EventNotifier, NotificationStats};

/// Common synchronization error types
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The wake primitive could not be created
    CreateFailed { message: String },
    /// Signalling or draining the wake primitive failed
    NotificationFailed,
    /// Waiting on the wake primitive failed
    WaitFailed { message: String },
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::CreateFailed { message } => {
                write!(f, "Wake primitive creation failed: {}", message)
            }
            SyncError::NotificationFailed => write!(f, "Notification system failed"),
            SyncError::WaitFailed { message } => write!(f, "Wait failed: {}", message),
        }
    }
}

impl std::error::Error for SyncError {}

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;

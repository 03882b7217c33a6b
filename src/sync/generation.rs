//! Per-node generation counters with wraparound-safe backlog arithmetic
//!
//! A node's generation counts every sample ever written to it. Writers bump
//! it with release ordering after the sample is in place, readers load it
//! with acquire ordering before trusting the slot it points at.

use std::sync::atomic::{AtomicU32, Ordering};

/// Generation number type for strong typing
pub type GenerationNumber = u32;

/// Largest backlog a subscriber can be told about.
///
/// Cursors are compared with unsigned wrapping subtraction, which is only
/// meaningful while the true distance stays below half the counter range.
/// Anything above that is reported as `MAX_BACKLOG`.
pub const MAX_BACKLOG: GenerationNumber = GenerationNumber::MAX / 2;

/// Number of publications between `last` and `current`, wrap-safe and saturating
#[inline]
pub fn backlog(current: GenerationNumber, last: GenerationNumber) -> GenerationNumber {
    let distance = current.wrapping_sub(last);
    if distance > MAX_BACKLOG {
        MAX_BACKLOG
    } else {
        distance
    }
}

/// Atomic publish counter of one node
#[derive(Debug, Default)]
pub struct Generation {
    value: AtomicU32,
}

impl Generation {
    /// Create a counter at zero (nothing published)
    pub const fn new() -> Self {
        Self {
            value: AtomicU32::new(0),
        }
    }

    /// Create a counter with an initial value
    pub const fn with_initial(initial: GenerationNumber) -> Self {
        Self {
            value: AtomicU32::new(initial),
        }
    }

    /// Load with acquire ordering
    ///
    /// Pairs with [`Generation::advance_release`]: every byte written before
    /// the advance is visible after this load.
    #[inline]
    pub fn load_acquire(&self) -> GenerationNumber {
        self.value.load(Ordering::Acquire)
    }

    /// Load with relaxed ordering, for writers already holding the node lock
    #[inline]
    pub fn load_relaxed(&self) -> GenerationNumber {
        self.value.load(Ordering::Relaxed)
    }

    /// Mark one more sample as complete, returning the new generation
    #[inline]
    pub fn advance_release(&self) -> GenerationNumber {
        self.value.fetch_add(1, Ordering::Release).wrapping_add(1)
    }

    /// Publications since `last`
    #[inline]
    pub fn updates_since(&self, last: GenerationNumber) -> GenerationNumber {
        backlog(self.load_acquire(), last)
    }
}

//! Monotonic microsecond clock
//!
//! Timestamps are microseconds since the clock was first read in this
//! process. Interval throttling and topic timestamps use it.

use std::time::Instant;

use lazy_static::lazy_static;

/// Absolute time in microseconds
pub type AbsoluteTime = u64;

lazy_static! {
    static ref CLOCK_EPOCH: Instant = Instant::now();
}

/// Current absolute time
pub fn absolute_time_us() -> AbsoluteTime {
    CLOCK_EPOCH.elapsed().as_micros() as AbsoluteTime
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_clock_is_monotonic() {
        let a = absolute_time_us();
        thread::sleep(Duration::from_millis(2));
        let b = absolute_time_us();
        assert!(b >= a + 1_000);
    }
}

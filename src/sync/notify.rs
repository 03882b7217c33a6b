//! Event notification using eventfd and condition-based wakeups
//!
//! Publishers signal an [`EventNotifier`] from their own call context, so
//! `notify` never blocks: on Linux it is a non-blocking write to an eventfd,
//! elsewhere a counter bump under a short mutex plus a condvar signal.
//! Waiters always pass a timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[cfg(target_os = "linux")]
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

#[cfg(target_os = "linux")]
use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags},
    sys::eventfd::{eventfd, EfdFlags},
    unistd::{read, write},
};

#[cfg(not(target_os = "linux"))]
use parking_lot::{Condvar, Mutex};

use super::{SyncError, SyncResult};

/// Counting wake object shared between publishers and a waiter
#[derive(Debug)]
pub struct EventNotifier {
    /// Event file descriptor for Linux eventfd notifications
    #[cfg(target_os = "linux")]
    event_fd: OwnedFd,
    /// Pending wake count for non-Linux systems
    #[cfg(not(target_os = "linux"))]
    pending: Mutex<u64>,
    #[cfg(not(target_os = "linux"))]
    condvar: Condvar,
    notify_count: AtomicU64,
    wait_count: AtomicU64,
    wakeup_count: AtomicU64,
}

impl EventNotifier {
    /// Create a new event notifier
    pub fn new() -> SyncResult<Self> {
        Ok(Self {
            #[cfg(target_os = "linux")]
            event_fd: Self::create_eventfd()?,
            #[cfg(not(target_os = "linux"))]
            pending: Mutex::new(0),
            #[cfg(not(target_os = "linux"))]
            condvar: Condvar::new(),
            notify_count: AtomicU64::new(0),
            wait_count: AtomicU64::new(0),
            wakeup_count: AtomicU64::new(0),
        })
    }

    #[cfg(target_os = "linux")]
    fn create_eventfd() -> SyncResult<OwnedFd> {
        eventfd(0, EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK).map_err(|e| {
            SyncError::CreateFailed {
                message: e.to_string(),
            }
        })
    }

    /// Signal the waiter. Never blocks.
    pub fn notify(&self) -> SyncResult<()> {
        self.notify_count.fetch_add(1, Ordering::Relaxed);

        #[cfg(target_os = "linux")]
        {
            let buf = 1u64.to_ne_bytes();
            match write(self.event_fd.as_raw_fd(), &buf) {
                Ok(_) => {}
                // counter saturated; the waiter is already due to wake
                Err(Errno::EAGAIN) => {}
                Err(_) => return Err(SyncError::NotificationFailed),
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            let mut pending = self.pending.lock();
            *pending = pending.saturating_add(1);
            self.condvar.notify_all();
        }

        Ok(())
    }

    /// Wait until notified or until `timeout` elapses.
    ///
    /// Returns `Ok(true)` if a notification was consumed and `Ok(false)` on
    /// timeout or interruption. Pending notifications are coalesced.
    pub fn wait(&self, timeout: Duration) -> SyncResult<bool> {
        self.wait_count.fetch_add(1, Ordering::Relaxed);

        #[cfg(target_os = "linux")]
        let woken = self.wait_on_eventfd(timeout)?;

        #[cfg(not(target_os = "linux"))]
        let woken = {
            let mut pending = self.pending.lock();
            if *pending == 0 && !timeout.is_zero() {
                let _ = self.condvar.wait_for(&mut pending, timeout);
            }
            if *pending > 0 {
                *pending = 0;
                true
            } else {
                false
            }
        };

        if woken {
            self.wakeup_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(woken)
    }

    #[cfg(target_os = "linux")]
    fn wait_on_eventfd(&self, timeout: Duration) -> SyncResult<bool> {
        let ready = {
            let mut fds = [PollFd::new(&self.event_fd, PollFlags::POLLIN)];
            match poll(&mut fds, poll_timeout_ms(timeout)) {
                Ok(0) => false,
                Ok(_) => true,
                Err(Errno::EINTR) => false,
                Err(e) => {
                    return Err(SyncError::WaitFailed {
                        message: e.to_string(),
                    })
                }
            }
        };

        if ready {
            // Reading resets the eventfd counter; EAGAIN means another
            // waiter drained it first.
            let mut buf = [0u8; 8];
            match read(self.event_fd.as_raw_fd(), &mut buf) {
                Ok(_) | Err(Errno::EAGAIN) => {}
                Err(_) => return Err(SyncError::NotificationFailed),
            }
        }
        Ok(ready)
    }

    /// Get the file descriptor for external polling (Linux only)
    #[cfg(target_os = "linux")]
    pub fn event_fd(&self) -> RawFd {
        self.event_fd.as_raw_fd()
    }

    /// Get notification statistics
    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            notify_count: self.notify_count.load(Ordering::Relaxed),
            wait_count: self.wait_count.load(Ordering::Relaxed),
            wakeup_count: self.wakeup_count.load(Ordering::Relaxed),
        }
    }
}

/// Millisecond poll timeout, rounded up so short waits do not become busy polls
#[cfg(target_os = "linux")]
fn poll_timeout_ms(timeout: Duration) -> i32 {
    let ms = (timeout.as_micros() + 999) / 1000;
    ms.min(i32::MAX as u128) as i32
}

/// Statistics for event notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationStats {
    /// Number of notifications sent
    pub notify_count: u64,
    /// Number of waits performed
    pub wait_count: u64,
    /// Number of waits that consumed a notification
    pub wakeup_count: u64,
}

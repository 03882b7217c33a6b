//! Blocking waits over subscriptions
//!
//! A wait registers one shared [`EventNotifier`] on every handle, re-checks
//! for pending data, then sleeps on the notifier. Every wait takes a timeout.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::error::Result;
use crate::sync::EventNotifier;
use crate::topic::Message;

use super::{callbacks::WakeTarget, subscription::Subscription};

/// Why a wait returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// This many subscriptions reported `updated()` on return
    Updated(usize),
    /// The timeout elapsed with nothing to read
    Timeout,
}

/// Wait until at least one subscription has data or `timeout` elapses.
///
/// Handles whose topic has no node yet get one created, so a producer that
/// appears during the wait still wakes it. Callers should still check each
/// handle with `updated()` afterwards.
pub fn poll(subscriptions: &mut [&mut Subscription], timeout: Duration) -> Result<WakeReason> {
    let notifier = Arc::new(EventNotifier::new()?);

    let mut registered = Vec::with_capacity(subscriptions.len());
    for index in 0..subscriptions.len() {
        match subscriptions[index].attach_waker(WakeTarget::Notifier(notifier.clone())) {
            Ok(id) => registered.push((index, id)),
            Err(e) => {
                for (index, id) in registered {
                    subscriptions[index].detach_waker(id);
                }
                return Err(e);
            }
        }
    }

    let outcome = wait_for_any(subscriptions, &notifier, timeout);

    for (index, id) in registered {
        subscriptions[index].detach_waker(id);
    }
    outcome
}

fn wait_for_any(
    subscriptions: &mut [&mut Subscription],
    notifier: &EventNotifier,
    timeout: Duration,
) -> Result<WakeReason> {
    let start = Instant::now();
    loop {
        let ready = subscriptions
            .iter_mut()
            .map(|subscription| subscription.updated())
            .filter(|&updated| updated)
            .count();
        if ready > 0 {
            return Ok(WakeReason::Updated(ready));
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(WakeReason::Timeout);
        }

        // a throttled handle may become ready without another publish
        let mut wait = timeout - elapsed;
        if let Some(held) = subscriptions
            .iter_mut()
            .filter_map(|subscription| subscription.throttle_remaining())
            .min()
        {
            wait = wait.min(held);
        }
        notifier.wait(wait)?;
    }
}

impl Subscription {
    /// Block until this subscription has data or `timeout` elapses
    pub fn updated_blocking(&mut self, timeout: Duration) -> Result<bool> {
        if self.updated() {
            return Ok(true);
        }
        let reason = poll(&mut [&mut *self], timeout)?;
        Ok(matches!(reason, WakeReason::Updated(_)))
    }

    /// Wait for data, then [`update`](Subscription::update)
    pub fn update_blocking<T: Message>(&mut self, dst: &mut T, timeout: Duration) -> Result<bool> {
        if self.updated_blocking(timeout)? {
            self.update(dst)
        } else {
            Ok(false)
        }
    }
}

//! Debounced ephemeral signals
//!
//! Typing and cursor changes are coalesced: each change replaces the pending
//! value and restarts a timer, and only the value held when the timer fires is
//! broadcast. Focus changes bypass this and go out immediately.

use std::time::Duration;

use crate::scheduler::{Scheduler, TimerId};
use crate::types::Timestamp;

/// Trailing-edge debouncer for one signal
#[derive(Debug)]
pub struct Debounced<V> {
    delay: Duration,
    pending: Option<V>,
    timer: Option<TimerId>,
}

impl<V> Debounced<V> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            timer: None,
        }
    }

    /// Stage a value and restart the quiet period.
    ///
    /// `flush` is the scheduler task that will later call [`Self::take`].
    pub fn stage<T: Clone>(&mut self, value: V, scheduler: &mut Scheduler<T>, now: Timestamp, flush: T) {
        if let Some(timer) = self.timer.take() {
            scheduler.cancel(timer);
        }
        self.pending = Some(value);
        self.timer = Some(scheduler.schedule_after(now, self.delay, flush));
    }

    /// Take the trailing value when the timer fires
    pub fn take(&mut self) -> Option<V> {
        self.timer = None;
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending value without sending it
    pub fn cancel<T: Clone>(&mut self, scheduler: &mut Scheduler<T>) {
        if let Some(timer) = self.timer.take() {
            scheduler.cancel(timer);
        }
        self.pending = None;
    }
}

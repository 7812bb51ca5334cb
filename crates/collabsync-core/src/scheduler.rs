//! Virtual-time timer scheduler.
//!
//! Provides `after()` and `every()` style timers for the session engine. The
//! scheduler never reads a clock itself: callers pass `now` in, which is what
//! lets tests advance time deterministically.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use crate::types::Timestamp;

/// Handle to a scheduled task, used for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// A scheduled task
#[derive(Debug)]
struct ScheduledTask<T> {
    /// When the task should run
    run_at: Timestamp,
    /// Unique task ID (also breaks ties in scheduling order)
    id: u64,
    task: T,
    /// If Some, this is a repeating task with the given interval (ms)
    repeat_every: Option<i64>,
}

impl<T> PartialEq for ScheduledTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ScheduledTask<T> {}

impl<T> PartialOrd for ScheduledTask<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ScheduledTask<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior (earliest first)
        other
            .run_at
            .cmp(&self.run_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Timer queue owned by a single control loop
#[derive(Debug)]
pub struct Scheduler<T> {
    tasks: BinaryHeap<ScheduledTask<T>>,
    cancelled: HashSet<u64>,
    next_id: u64,
}

impl<T: Clone> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            tasks: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_id: 0,
        }
    }

    fn push(&mut self, run_at: Timestamp, task: T, repeat_every: Option<i64>) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.push(ScheduledTask {
            run_at,
            id,
            task,
            repeat_every,
        });
        TimerId(id)
    }

    /// Add a one-shot task
    pub fn schedule_after(&mut self, now: Timestamp, delay: Duration, task: T) -> TimerId {
        self.push(now + delay.as_millis() as i64, task, None)
    }

    /// Add a repeating task. The first run is one interval from `now`.
    pub fn schedule_every(&mut self, now: Timestamp, interval: Duration, task: T) -> TimerId {
        let every = (interval.as_millis() as i64).max(1);
        self.push(now + every, task, Some(every))
    }

    /// Cancel a task. Cancelling an already-fired one-shot task is a no-op.
    pub fn cancel(&mut self, id: TimerId) {
        if self.tasks.iter().any(|t| t.id == id.0) {
            self.cancelled.insert(id.0);
        }
    }

    /// Drop every pending task
    pub fn clear(&mut self) {
        self.tasks.clear();
        self.cancelled.clear();
    }

    fn discard_cancelled_head(&mut self) {
        while let Some(head) = self.tasks.peek() {
            if self.cancelled.remove(&head.id) {
                self.tasks.pop();
            } else {
                break;
            }
        }
    }

    /// Get the next task if it's due. Repeating tasks are re-armed.
    pub fn pop_ready(&mut self, now: Timestamp) -> Option<(TimerId, T)> {
        self.discard_cancelled_head();
        if self.tasks.peek()?.run_at > now {
            return None;
        }
        let task = self.tasks.pop()?;
        let fired = task.task.clone();
        if let Some(every) = task.repeat_every {
            // Keep cadence, but don't replay every missed period after a long gap
            let mut run_at = task.run_at + every;
            if run_at <= now {
                run_at = now + every;
            }
            self.tasks.push(ScheduledTask { run_at, ..task });
        }
        Some((TimerId(task.id), fired))
    }

    /// Due time of the earliest live task
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        self.discard_cancelled_head();
        self.tasks.peek().map(|t| t.run_at)
    }

    /// Number of live tasks
    pub fn len(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| !self.cancelled.contains(&t.id))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(s: &mut Scheduler<&'static str>, now: Timestamp) -> Vec<&'static str> {
        let mut fired = Vec::new();
        while let Some((_, t)) = s.pop_ready(now) {
            fired.push(t);
        }
        fired
    }

    #[test]
    fn test_one_shot_fires_once_when_due() {
        let mut s = Scheduler::new();
        s.schedule_after(0, Duration::from_millis(100), "a");
        assert!(drain(&mut s, 99).is_empty());
        assert_eq!(drain(&mut s, 100), vec!["a"]);
        assert!(drain(&mut s, 1_000).is_empty());
        assert!(s.is_empty());
    }

    #[test]
    fn test_earliest_first_then_scheduling_order() {
        let mut s = Scheduler::new();
        s.schedule_after(0, Duration::from_millis(50), "late");
        s.schedule_after(0, Duration::from_millis(10), "first");
        s.schedule_after(0, Duration::from_millis(10), "second");
        assert_eq!(drain(&mut s, 100), vec!["first", "second", "late"]);
    }

    #[test]
    fn test_repeating_task_rearms() {
        let mut s = Scheduler::new();
        s.schedule_every(0, Duration::from_millis(5_000), "beat");
        assert_eq!(s.next_deadline(), Some(5_000));
        assert_eq!(drain(&mut s, 5_000), vec!["beat"]);
        assert_eq!(s.next_deadline(), Some(10_000));
        // A long gap fires once, not once per missed period
        assert_eq!(drain(&mut s, 60_000), vec!["beat"]);
        assert_eq!(s.next_deadline(), Some(65_000));
    }

    #[test]
    fn test_cancelled_task_never_fires() {
        let mut s = Scheduler::new();
        let id = s.schedule_after(0, Duration::from_millis(10), "gone");
        s.schedule_after(0, Duration::from_millis(20), "kept");
        s.cancel(id);
        assert_eq!(s.len(), 1);
        assert_eq!(s.next_deadline(), Some(20));
        assert_eq!(drain(&mut s, 100), vec!["kept"]);
    }

    #[test]
    fn test_cancel_repeating() {
        let mut s = Scheduler::new();
        let id = s.schedule_every(0, Duration::from_millis(10), "tick");
        assert_eq!(drain(&mut s, 10), vec!["tick"]);
        s.cancel(id);
        assert!(drain(&mut s, 1_000).is_empty());
        assert_eq!(s.next_deadline(), None);
    }
}

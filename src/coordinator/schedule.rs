//! Deadline-ordered timer queue

use std::collections::BTreeMap;

/// Handle to a scheduled timer, used to cancel it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

/// What a timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    RevealLoading,
    RevealOverride,
    Confirm,
    Navigate,
}

/// Pending timers ordered by `(deadline, scheduling order)`
#[derive(Debug, Default)]
pub struct Schedule {
    timers: BTreeMap<(i64, TimerHandle), TimerKind>,
    next_seq: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` to fire at `deadline` (epoch millis)
    pub fn schedule(&mut self, deadline: i64, kind: TimerKind) -> TimerHandle {
        let handle = TimerHandle(self.next_seq);
        self.next_seq += 1;
        self.timers.insert((deadline, handle), kind);
        handle
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let key = self.timers.keys().find(|(_, h)| *h == handle).copied();
        match key {
            Some(key) => self.timers.remove(&key).is_some(),
            None => false,
        }
    }

    /// Remove and return the earliest timer whose deadline is <= `now`
    pub fn pop_due(&mut self, now: i64) -> Option<(i64, TimerHandle, TimerKind)> {
        let (&(deadline, handle), _) = self.timers.iter().next()?;
        if deadline > now {
            return None;
        }
        let kind = self.timers.remove(&(deadline, handle))?;
        Some((deadline, handle, kind))
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<i64> {
        self.timers.keys().next().map(|(deadline, _)| *deadline)
    }
}

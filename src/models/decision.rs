//! Decision record: persisted evidence that the gate was already passed

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Persisted `{ started, timestamp }` pair written when the gate transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Whether the user started playback (or overrode the gate)
    pub started: bool,

    /// Epoch milliseconds of the transition
    pub timestamp_millis: i64,
}

impl DecisionRecord {
    /// Record written at the moment of transition
    pub fn started_at(timestamp_millis: i64) -> Self {
        Self {
            started: true,
            timestamp_millis,
        }
    }

    /// Parse the two raw string entries as stored.
    ///
    /// Returns `None` when either entry is missing or malformed, or when the
    /// timestamp lies in the future relative to `now_millis`. All of those are
    /// treated the same as "no prior session".
    pub fn from_entries(
        started: Option<&str>,
        timestamp: Option<&str>,
        now_millis: i64,
    ) -> Option<Self> {
        let started = match started?.trim() {
            "true" => true,
            "false" => false,
            _ => return None,
        };
        let timestamp_millis: i64 = timestamp?.trim().parse().ok()?;

        if timestamp_millis < 0 || timestamp_millis > now_millis {
            return None;
        }

        Some(Self {
            started,
            timestamp_millis,
        })
    }

    /// String form of the `started` entry
    pub fn started_entry(&self) -> String {
        self.started.to_string()
    }

    /// String form of the timestamp entry
    pub fn timestamp_entry(&self) -> String {
        self.timestamp_millis.to_string()
    }

    /// Age of the record relative to `now_millis` (zero if clocks disagree)
    pub fn age(&self, now_millis: i64) -> Duration {
        let delta = now_millis.saturating_sub(self.timestamp_millis).max(0);
        Duration::from_millis(delta as u64)
    }

    /// True when the gate should be skipped: started and younger than `ttl`
    pub fn is_fresh(&self, now_millis: i64, ttl: Duration) -> bool {
        self.started && self.age(now_millis) < ttl
    }

    /// Wall-clock time of the record, for display
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_millis).single()
    }
}

// src/engine/clock.rs

//! Session Clock: the single time authority for every session.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::time::{Instant, Sleep};

/// Where an exam window stands relative to a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExamPhase {
    Scheduled,
    Ongoing,
    Completed,
}

/// Classifies `now` against an exam window. Both bounds are inclusive for `Ongoing`.
pub fn classify(now: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> ExamPhase {
    if now < start {
        ExamPhase::Scheduled
    } else if now <= end {
        ExamPhase::Ongoing
    } else {
        ExamPhase::Completed
    }
}

/// Time left until `deadline`, zero once it has passed.
pub fn remaining(now: DateTime<Utc>, deadline: DateTime<Utc>) -> Duration {
    (deadline - now).to_std().unwrap_or(Duration::ZERO)
}

/// Seconds with millisecond precision, as sent on the wire.
pub fn as_wire_seconds(d: Duration) -> f64 {
    (d.as_millis() as f64) / 1000.0
}

/// Wall clock derived from tokio's monotonic clock.
///
/// Reads never go backwards for the life of the process, and they follow
/// tokio's paused clock under `test-util`.
#[derive(Debug, Clone)]
pub struct SessionClock {
    anchor_wall: DateTime<Utc>,
    anchor: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// A clock that reads `wall` right now.
    pub fn anchored_at(wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall: wall,
            anchor: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.anchor_wall + TimeDelta::from_std(self.anchor.elapsed()).unwrap_or(TimeDelta::zero())
    }

    pub fn remaining_until(&self, deadline: DateTime<Utc>) -> Duration {
        remaining(self.now(), deadline)
    }

    /// Sleeps until this clock reads `deadline`.
    pub fn sleep_until(&self, deadline: DateTime<Utc>) -> Sleep {
        tokio::time::sleep(self.remaining_until(deadline))
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

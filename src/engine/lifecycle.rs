// src/engine/lifecycle.rs

//! Lifecycle State Machine: Pending -> Running(index) -> Ended.
//!
//! Only the scheduler applies transitions. Everything else reads snapshots.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Running,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Ended => "ended",
        }
    }
}

/// A state change requested by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Pending -> Running at the given question.
    Start { question_index: usize },
    /// Running(i) -> Running(j), j > i.
    Advance { question_index: usize },
    /// Pending | Running -> Ended.
    End,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("cannot {transition:?} from {from:?}")]
    Illegal {
        from: SessionStatus,
        transition: Transition,
    },

    #[error("question index may not move from {from} to {to}")]
    Backwards { from: usize, to: usize },
}

/// Point-in-time view of one exam session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub paper_key: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub question_count: usize,
    pub status: SessionStatus,
    /// `None` until the first question goes live; kept after the session ends.
    pub current_question_index: Option<usize>,
    /// Expiry of the live question. `None` unless Running.
    pub question_deadline: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn pending(
        paper_key: &str,
        title: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        question_count: usize,
    ) -> Self {
        Self {
            paper_key: paper_key.to_string(),
            title: title.to_string(),
            start_time,
            end_time,
            question_count,
            status: SessionStatus::Pending,
            current_question_index: None,
            question_deadline: None,
        }
    }

    /// Wire form of the current index: -1 before start.
    pub fn current_index_or_minus_one(&self) -> i64 {
        self.current_question_index.map_or(-1, |i| i as i64)
    }

    /// Applies a transition, returning the next snapshot. `deadline` is the live
    /// question's expiry for `Start`/`Advance` and ignored for `End`.
    pub fn transition(
        &self,
        transition: Transition,
        deadline: DateTime<Utc>,
    ) -> Result<Self, LifecycleError> {
        let illegal = || LifecycleError::Illegal {
            from: self.status,
            transition,
        };
        let mut next = self.clone();

        match (self.status, transition) {
            (SessionStatus::Pending, Transition::Start { question_index }) => {
                next.status = SessionStatus::Running;
                next.current_question_index = Some(question_index);
                next.question_deadline = Some(deadline);
            }
            (SessionStatus::Running, Transition::Advance { question_index }) => {
                let from = self.current_question_index.ok_or_else(illegal)?;
                if question_index <= from {
                    return Err(LifecycleError::Backwards {
                        from,
                        to: question_index,
                    });
                }
                next.current_question_index = Some(question_index);
                next.question_deadline = Some(deadline);
            }
            (SessionStatus::Pending | SessionStatus::Running, Transition::End) => {
                next.status = SessionStatus::Ended;
                next.question_deadline = None;
            }
            _ => return Err(illegal()),
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn snapshot() -> SessionSnapshot {
        let start = Utc::now();
        SessionSnapshot::pending("k", "Title", start, start + TimeDelta::seconds(60), 3)
    }

    #[test]
    fn full_lifecycle() {
        let deadline = Utc::now();
        let s = snapshot();
        assert_eq!(s.current_index_or_minus_one(), -1);

        let s = s
            .transition(Transition::Start { question_index: 0 }, deadline)
            .unwrap();
        assert_eq!(s.status, SessionStatus::Running);
        assert_eq!(s.question_deadline, Some(deadline));

        let s = s
            .transition(Transition::Advance { question_index: 2 }, deadline)
            .unwrap();
        assert_eq!(s.current_question_index, Some(2));

        let s = s.transition(Transition::End, deadline).unwrap();
        assert_eq!(s.status, SessionStatus::Ended);
        assert_eq!(s.current_question_index, Some(2));
        assert_eq!(s.question_deadline, None);
    }

    #[test]
    fn ended_is_terminal() {
        let now = Utc::now();
        let ended = snapshot().transition(Transition::End, now).unwrap();

        assert!(ended.transition(Transition::End, now).is_err());
        assert!(
            ended
                .transition(Transition::Start { question_index: 0 }, now)
                .is_err()
        );
        assert!(
            ended
                .transition(Transition::Advance { question_index: 1 }, now)
                .is_err()
        );
    }

    #[test]
    fn index_never_moves_backwards() {
        let now = Utc::now();
        let running = snapshot()
            .transition(Transition::Start { question_index: 1 }, now)
            .unwrap();

        assert_eq!(
            running.transition(Transition::Advance { question_index: 1 }, now),
            Err(LifecycleError::Backwards { from: 1, to: 1 })
        );
        assert_eq!(
            running.transition(Transition::Advance { question_index: 0 }, now),
            Err(LifecycleError::Backwards { from: 1, to: 0 })
        );
    }

    #[test]
    fn cannot_start_twice_or_advance_while_pending() {
        let now = Utc::now();
        let pending = snapshot();
        assert!(
            pending
                .transition(Transition::Advance { question_index: 1 }, now)
                .is_err()
        );

        let running = pending
            .transition(Transition::Start { question_index: 0 }, now)
            .unwrap();
        assert!(
            running
                .transition(Transition::Start { question_index: 1 }, now)
                .is_err()
        );
    }
}

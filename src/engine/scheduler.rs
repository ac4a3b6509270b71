// src/engine/scheduler.rs

//! Scheduler: the per-session control loop that owns the timeline.
//!
//! Each session gets its own task. It sleeps until the live question's
//! deadline (never past the exam's end), then advances, broadcasts and sleeps
//! again. Sessions share nothing, so a stalled session cannot delay another.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{
    config::EngineConfig,
    engine::{
        clock::SessionClock,
        lifecycle::{SessionSnapshot, SessionStatus, Transition},
        proctor::ProctorLog,
        registry::SessionRegistry,
        session::{LiveSession, SchedulerCommand},
    },
    models::question::Paper,
};

const COMMAND_BUFFER: usize = 16;

/// Where the exam stands at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    NotStarted,
    Live {
        index: usize,
        deadline: DateTime<Utc>,
    },
    Finished,
}

/// Question slots of a paper. Each question runs for its time limit from the
/// moment it goes live, and no deadline ever passes the exam's end.
#[derive(Debug, Clone)]
pub(crate) struct Timeline {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limits: Vec<TimeDelta>,
}

impl Timeline {
    pub(crate) fn from_paper(paper: &Paper) -> Self {
        Self {
            start: paper.start_time,
            end: paper.end_time,
            limits: paper.questions.iter().map(|q| q.time_limit()).collect(),
        }
    }

    fn deadline(&self, index: usize, started_at: DateTime<Utc>) -> DateTime<Utc> {
        (started_at + self.limits[index]).min(self.end)
    }

    /// Placement at `now` counting slots back to back from the start time.
    pub(crate) fn placement(&self, now: DateTime<Utc>) -> Placement {
        if now < self.start {
            return Placement::NotStarted;
        }
        self.roll_forward(0, self.start, now)
    }

    /// First live slot at or after question `from`, which went live at `started_at`.
    pub(crate) fn roll_forward(
        &self,
        from: usize,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Placement {
        if now >= self.end {
            return Placement::Finished;
        }
        let mut started = started_at;
        for index in from..self.limits.len() {
            let deadline = self.deadline(index, started);
            if now < deadline {
                return Placement::Live { index, deadline };
            }
            started = deadline;
        }
        Placement::Finished
    }
}

pub(crate) struct Scheduler {
    session: Arc<LiveSession>,
    timeline: Timeline,
    clock: SessionClock,
    drain: Duration,
    commands: mpsc::Receiver<SchedulerCommand>,
    registry: Weak<SessionRegistry>,
}

impl Scheduler {
    /// Builds a session and its scheduler, already placed on the timeline.
    pub(crate) fn new(
        paper: Arc<Paper>,
        clock: SessionClock,
        config: &EngineConfig,
        registry: Weak<SessionRegistry>,
    ) -> (Arc<LiveSession>, Self) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let initial = SessionSnapshot::pending(
            &paper.paper_key,
            &paper.title,
            paper.start_time,
            paper.end_time,
            paper.questions.len(),
        );
        let timeline = Timeline::from_paper(&paper);
        let proctor = ProctorLog::new(config.proctor_strike_limit);
        let session = Arc::new(LiveSession::new(paper, initial, proctor, tx));

        let mut scheduler = Self {
            session: session.clone(),
            timeline,
            clock,
            drain: config.drain_period,
            commands: rx,
            registry,
        };
        let now = scheduler.clock.now();
        scheduler.tick(now);

        (session, scheduler)
    }

    pub(crate) async fn run(mut self) {
        let key = self.session.paper_key().to_string();
        debug!("Scheduler for {} running", key);

        while let Some(wake_at) = self.next_wake() {
            tokio::select! {
                _ = self.clock.sleep_until(wake_at) => {
                    let now = self.clock.now();
                    self.tick(now);
                }
                command = self.commands.recv() => match command {
                    Some(SchedulerCommand::AllAnswered { question_index }) => {
                        self.advance_early(question_index);
                    }
                    Some(SchedulerCommand::Shutdown) | None => {
                        let now = self.clock.now();
                        self.end(now);
                        return;
                    }
                },
            }
        }

        if !self.drain.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.drain) => {}
                Some(SchedulerCommand::Shutdown) = self.commands.recv() => {}
            }
        }

        if let Some(registry) = self.registry.upgrade()
            && registry.remove(&self.session)
        {
            info!("Session {} retired", key);
        }
    }

    fn next_wake(&self) -> Option<DateTime<Utc>> {
        let snapshot = self.session.snapshot();
        match snapshot.status {
            SessionStatus::Pending => Some(snapshot.start_time),
            SessionStatus::Running => Some(snapshot.question_deadline.unwrap_or(snapshot.end_time)),
            SessionStatus::Ended => None,
        }
    }

    /// Moves the session to wherever the clock says it should be.
    fn tick(&mut self, now: DateTime<Utc>) {
        let snapshot = self.session.snapshot();
        match snapshot.status {
            SessionStatus::Pending => match self.timeline.placement(now) {
                Placement::NotStarted => {}
                Placement::Live { index, deadline } => {
                    self.apply(Transition::Start { question_index: index }, deadline, now);
                }
                Placement::Finished => self.end(now),
            },
            SessionStatus::Running => {
                let (Some(index), Some(deadline)) =
                    (snapshot.current_question_index, snapshot.question_deadline)
                else {
                    self.end(now);
                    return;
                };
                if now < deadline && now < snapshot.end_time {
                    return;
                }
                // The next question goes live at this one's deadline, not at
                // the moment we woke up.
                match self.timeline.roll_forward(index + 1, deadline, now) {
                    Placement::Live { index, deadline } => {
                        self.apply(Transition::Advance { question_index: index }, deadline, now);
                    }
                    Placement::Finished | Placement::NotStarted => self.end(now),
                }
            }
            SessionStatus::Ended => {}
        }
    }

    /// Everyone attached has answered: move on without waiting for the deadline.
    fn advance_early(&mut self, question_index: usize) {
        let snapshot = self.session.snapshot();
        if snapshot.status != SessionStatus::Running
            || snapshot.current_question_index != Some(question_index)
        {
            return;
        }
        let now = self.clock.now();
        info!(
            "Session {}: all participants answered question {}",
            snapshot.paper_key, question_index
        );
        match self.timeline.roll_forward(question_index + 1, now, now) {
            Placement::Live { index, deadline } => {
                self.apply(Transition::Advance { question_index: index }, deadline, now);
            }
            Placement::Finished | Placement::NotStarted => self.end(now),
        }
    }

    fn end(&mut self, now: DateTime<Utc>) {
        self.apply(Transition::End, now, now);
    }

    fn apply(&mut self, transition: Transition, deadline: DateTime<Utc>, now: DateTime<Utc>) {
        let current = self.session.snapshot();
        match current.transition(transition, deadline) {
            Ok(next) => {
                match transition {
                    Transition::End => info!("Session {} ended", next.paper_key),
                    Transition::Start { question_index } | Transition::Advance { question_index } => {
                        info!(
                            "Session {}: question {} live until {}",
                            next.paper_key, question_index, deadline
                        )
                    }
                }
                self.session.publish(next, now);
            }
            Err(e) => error!("Session {}: {}", current.paper_key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(limits: &[i64], window: i64) -> (Timeline, DateTime<Utc>) {
        let start = DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let t = Timeline {
            start,
            end: start + TimeDelta::seconds(window),
            limits: limits.iter().map(|s| TimeDelta::seconds(*s)).collect(),
        };
        (t, start)
    }

    fn at(start: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
        start + TimeDelta::seconds(secs)
    }

    #[test]
    fn placement_before_start() {
        let (t, start) = timeline(&[30, 30], 60);
        assert_eq!(t.placement(at(start, -1)), Placement::NotStarted);
    }

    #[test]
    fn placement_mid_exam_lands_on_second_slot() {
        let (t, start) = timeline(&[30, 30], 60);
        assert_eq!(
            t.placement(at(start, 35)),
            Placement::Live {
                index: 1,
                deadline: at(start, 60)
            }
        );
    }

    #[test]
    fn placement_at_slot_boundary_moves_on() {
        let (t, start) = timeline(&[30, 30], 60);
        assert_eq!(
            t.placement(at(start, 30)),
            Placement::Live {
                index: 1,
                deadline: at(start, 60)
            }
        );
    }

    #[test]
    fn end_time_clamps_question_deadline() {
        let (t, start) = timeline(&[30, 45], 60);
        assert_eq!(
            t.placement(at(start, 31)),
            Placement::Live {
                index: 1,
                deadline: at(start, 60)
            }
        );
        assert_eq!(t.placement(at(start, 60)), Placement::Finished);
    }

    #[test]
    fn finishes_when_questions_run_out_before_end() {
        let (t, start) = timeline(&[10, 10], 600);
        assert_eq!(t.placement(at(start, 25)), Placement::Finished);
    }

    #[test]
    fn late_wake_rolls_over_expired_slots() {
        let (t, start) = timeline(&[10, 10, 10, 10], 100);
        // Question 0 expired at +10 but we only woke at +25.
        assert_eq!(
            t.roll_forward(1, at(start, 10), at(start, 25)),
            Placement::Live {
                index: 2,
                deadline: at(start, 30)
            }
        );
    }

    #[test]
    fn early_advance_restarts_the_clock() {
        let (t, start) = timeline(&[30, 30], 120);
        let now = at(start, 5);
        assert_eq!(
            t.roll_forward(1, now, now),
            Placement::Live {
                index: 1,
                deadline: at(start, 35)
            }
        );
    }
}

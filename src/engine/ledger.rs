// src/engine/ledger.rs

//! Answer Ledger: one locked answer per participant per question.

use std::collections::{HashMap, hash_map::Entry};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::{
    engine::{
        clock::SessionClock,
        lifecycle::{SessionSnapshot, SessionStatus},
        session::{LiveSession, SchedulerCommand},
    },
    error::SessionError,
    models::exam_record::AnswerRecord,
    store::QuestionStore,
};

/// Locked answers of one session, per participant and then per question.
#[derive(Debug, Default)]
pub struct AnswerLedger {
    records: DashMap<String, HashMap<usize, AnswerRecord>>,
}

impl AnswerLedger {
    /// Writes and locks the record in one step. Only the first writer for a
    /// `(user_id, question_index)` key succeeds; the participant's shard lock
    /// makes the check and the insert atomic.
    pub fn lock(
        &self,
        user_id: &str,
        question_index: usize,
        record: AnswerRecord,
    ) -> Result<(), SessionError> {
        let mut answers = self.records.entry(user_id.to_string()).or_default();
        match answers.entry(question_index) {
            Entry::Occupied(_) => Err(SessionError::DuplicateSubmission),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    pub fn get(&self, user_id: &str, question_index: usize) -> Option<AnswerRecord> {
        self.records
            .get(user_id)
            .and_then(|answers| answers.get(&question_index).cloned())
    }

    pub fn contains(&self, user_id: &str, question_index: usize) -> bool {
        self.records
            .get(user_id)
            .is_some_and(|answers| answers.contains_key(&question_index))
    }

    pub fn len(&self) -> usize {
        self.records.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A participant's locked answers ordered by question.
    pub fn answers_of(&self, user_id: &str) -> Vec<(usize, AnswerRecord)> {
        let mut answers: Vec<(usize, AnswerRecord)> = self
            .records
            .get(user_id)
            .map(|answers| answers.iter().map(|(i, r)| (*i, r.clone())).collect())
            .unwrap_or_default();
        answers.sort_by_key(|(index, _)| *index);
        answers
    }
}

/// Rejects submissions for anything but the live, unexpired question.
pub(crate) fn check_live(
    snapshot: &SessionSnapshot,
    question_index: usize,
    now: DateTime<Utc>,
) -> Result<(), SessionError> {
    match snapshot.status {
        SessionStatus::Pending => Err(SessionError::NotStarted),
        SessionStatus::Ended => Err(SessionError::SessionEnded),
        SessionStatus::Running => {
            let current = snapshot.current_question_index.unwrap_or_default();
            let expired = snapshot.question_deadline.is_none_or(|d| now >= d);
            if question_index != current || expired {
                Err(SessionError::StaleSubmission {
                    expected: current,
                    got: question_index,
                })
            } else {
                Ok(())
            }
        }
    }
}

/// Everything `submit` needs besides the session itself.
pub(crate) struct SubmitContext<'a> {
    pub store: &'a dyn QuestionStore,
    pub clock: &'a SessionClock,
    pub advance_when_all_answered: bool,
}

/// Accepts and locks one answer. Returns whether it was correct; the result
/// goes back to the submitter only.
pub(crate) async fn submit(
    ctx: &SubmitContext<'_>,
    session: &LiveSession,
    user_id: &str,
    question_index: usize,
    option_id: usize,
) -> Result<bool, SessionError> {
    let paper_key = session.paper_key();
    check_live(&session.snapshot(), question_index, ctx.clock.now())?;

    let question = &session.paper().questions[question_index];
    if option_id >= question.options.len() {
        return Err(SessionError::InvalidOption(option_id));
    }
    if session.ledger.contains(user_id, question_index) {
        return Err(SessionError::DuplicateSubmission);
    }

    let correct_option = ctx
        .store
        .correct_option(paper_key, question_index)
        .await
        .map_err(|e| {
            tracing::error!("Answer key lookup failed for {}: {}", paper_key, e);
            SessionError::SessionUnavailable(paper_key.to_string())
        })?;

    let correct = option_id == correct_option;
    let everyone_answered = {
        // Holding the roster keeps the scheduler from publishing a new
        // question between the liveness check and the lock.
        let roster = session.roster();
        let now = ctx.clock.now();
        check_live(&session.snapshot(), question_index, now)?;
        session.ledger.lock(
            user_id,
            question_index,
            AnswerRecord {
                option_id,
                correct,
                points: if correct { question.max_points } else { 0 },
                locked_at: now,
            },
        )?;
        ctx.advance_when_all_answered
            && roster.len() > 0
            && roster
                .user_ids()
                .all(|u| session.ledger.contains(u, question_index))
    };
    debug!(
        "{} locked option {} for {} question {}",
        user_id, option_id, paper_key, question_index
    );

    if everyone_answered {
        session.notify(SchedulerCommand::AllAnswered { question_index });
    }

    Ok(correct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn record(option_id: usize) -> AnswerRecord {
        AnswerRecord {
            option_id,
            correct: option_id == 0,
            points: 1,
            locked_at: Utc::now(),
        }
    }

    #[test]
    fn second_lock_is_rejected_and_first_kept() {
        let ledger = AnswerLedger::default();
        ledger.lock("alice", 0, record(0)).unwrap();

        assert_eq!(
            ledger.lock("alice", 0, record(1)),
            Err(SessionError::DuplicateSubmission)
        );
        assert_eq!(ledger.get("alice", 0).unwrap().option_id, 0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn keys_are_per_user_and_question() {
        let ledger = AnswerLedger::default();
        ledger.lock("alice", 0, record(0)).unwrap();
        ledger.lock("alice", 1, record(1)).unwrap();
        ledger.lock("bob", 0, record(1)).unwrap();

        assert!(ledger.contains("bob", 0));
        assert!(!ledger.contains("bob", 1));
        assert!(!ledger.contains("carol", 0));
        assert_eq!(ledger.len(), 3);

        let answers = ledger.answers_of("alice");
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].0, 0);
        assert_eq!(answers[1].0, 1);
    }

    #[test]
    fn concurrent_locks_accept_exactly_one() {
        let ledger = std::sync::Arc::new(AnswerLedger::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                std::thread::spawn(move || ledger.lock("alice", 3, record(i)).is_ok())
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(accepted, 1);
    }

    #[test]
    fn check_live_classifies_rejections() {
        let now = Utc::now();
        let mut s = SessionSnapshot::pending("k", "T", now, now + TimeDelta::seconds(60), 2);
        assert_eq!(check_live(&s, 0, now), Err(SessionError::NotStarted));

        s.status = SessionStatus::Running;
        s.current_question_index = Some(1);
        s.question_deadline = Some(now + TimeDelta::seconds(10));
        assert!(check_live(&s, 1, now).is_ok());
        assert_eq!(
            check_live(&s, 0, now),
            Err(SessionError::StaleSubmission {
                expected: 1,
                got: 0
            })
        );
        assert!(check_live(&s, 1, now + TimeDelta::seconds(10)).is_err());

        s.status = SessionStatus::Ended;
        assert_eq!(check_live(&s, 1, now), Err(SessionError::SessionEnded));
    }
}

// src/engine/session.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};

use crate::{
    engine::{
        connection::{Roster, sync_message},
        ledger::AnswerLedger,
        lifecycle::SessionSnapshot,
        proctor::ProctorLog,
    },
    models::{
        exam_record::AnswerRecord,
        question::{Paper, PublicQuestion},
    },
};

/// Requests the scheduler accepts from the rest of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SchedulerCommand {
    /// Every attached participant has a locked answer for this question.
    AllAnswered { question_index: usize },
    Shutdown,
}

/// One live exam session, shared by every component that touches it.
///
/// The snapshot has a single writer (the session's scheduler, through
/// [`LiveSession::publish`]). The roster lock is held while a new snapshot is
/// published and fanned out, and while a participant attaches, so nobody can
/// be resynced to a question older than one already delivered to them.
pub struct LiveSession {
    paper: Arc<Paper>,
    questions: Vec<PublicQuestion>,
    state: watch::Sender<SessionSnapshot>,
    roster: Mutex<Roster>,
    pub(crate) ledger: AnswerLedger,
    pub(crate) proctor: ProctorLog,
    commands: mpsc::Sender<SchedulerCommand>,
}

impl LiveSession {
    pub(crate) fn new(
        paper: Arc<Paper>,
        initial: SessionSnapshot,
        proctor: ProctorLog,
        commands: mpsc::Sender<SchedulerCommand>,
    ) -> Self {
        let questions = paper.questions.iter().map(|q| q.to_public()).collect();
        let (state, _) = watch::channel(initial);

        Self {
            paper,
            questions,
            state,
            roster: Mutex::new(Roster::default()),
            ledger: AnswerLedger::default(),
            proctor,
            commands,
        }
    }

    pub fn paper_key(&self) -> &str {
        &self.paper.paper_key
    }

    pub fn title(&self) -> &str {
        &self.paper.title
    }

    pub fn paper(&self) -> &Paper {
        &self.paper
    }

    pub fn questions(&self) -> &[PublicQuestion] {
        &self.questions
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// A participant's locked answers ordered by question.
    pub fn answers_of(&self, user_id: &str) -> Vec<(usize, AnswerRecord)> {
        self.ledger.answers_of(user_id)
    }

    pub fn participant_count(&self) -> usize {
        self.roster.lock().len()
    }

    pub(crate) fn roster(&self) -> MutexGuard<'_, Roster> {
        self.roster.lock()
    }

    /// Replaces the snapshot and delivers the matching message to every attachment.
    pub(crate) fn publish(&self, snapshot: SessionSnapshot, now: DateTime<Utc>) {
        let mut roster = self.roster.lock();
        let message = Arc::new(sync_message(&snapshot, &self.questions, now));
        self.state.send_replace(snapshot.clone());
        roster.broadcast(&snapshot, message);
    }

    pub(crate) fn notify(&self, command: SchedulerCommand) {
        if let Err(e) = self.commands.try_send(command) {
            tracing::debug!("Scheduler for {} not accepting {:?}: {}", self.paper_key(), command, e);
        }
    }

    pub(crate) async fn shutdown(&self) {
        let _ = self.commands.send(SchedulerCommand::Shutdown).await;
    }
}

// src/engine/mod.rs

//! Real-time exam session engine.
//!
//! One [`LiveSession`] per paper key drives a single authoritative question
//! timeline to every attached participant:
//!
//! * [`registry::SessionRegistry`] creates sessions lazily, one per key.
//! * [`scheduler`] runs one timed loop per session.
//! * [`connection::ConnectionManager`] attaches participants and resyncs them.
//! * [`ledger`] locks at most one answer per participant per question.
//! * [`lifecycle`] guards the Pending -> Running -> Ended transitions.
//! * [`clock::SessionClock`] is the only source of "now".

use std::sync::Arc;

use uuid::Uuid;

use crate::{config::EngineConfig, error::SessionError, store::QuestionStore};

pub mod clock;
pub mod connection;
pub mod ledger;
pub mod lifecycle;
pub mod proctor;
pub mod registry;
pub mod scheduler;
pub mod session;

pub use clock::{ExamPhase, SessionClock};
pub use connection::{ConnectionManager, Outbound};
pub use lifecycle::{SessionSnapshot, SessionStatus};
pub use proctor::Strike;
pub use registry::SessionRegistry;
pub use session::LiveSession;

pub struct ExamEngine {
    registry: Arc<SessionRegistry>,
    connections: ConnectionManager,
    store: Arc<dyn QuestionStore>,
    clock: SessionClock,
    config: EngineConfig,
}

impl ExamEngine {
    pub fn new(store: Arc<dyn QuestionStore>, config: EngineConfig) -> Self {
        Self::with_clock(store, config, SessionClock::new())
    }

    pub fn with_clock(
        store: Arc<dyn QuestionStore>,
        config: EngineConfig,
        clock: SessionClock,
    ) -> Self {
        let registry = SessionRegistry::new(store.clone(), clock.clone(), config.clone());
        let connections = ConnectionManager::new(registry.clone(), clock.clone());

        Self {
            registry,
            connections,
            store,
            clock,
            config,
        }
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// `join {paperKey, title}`: attach and resync.
    pub async fn join(
        &self,
        paper_key: &str,
        title: &str,
        user_id: &str,
        connection_id: Uuid,
        sender: Outbound,
    ) -> Result<Arc<LiveSession>, SessionError> {
        self.connections
            .attach(paper_key, title, user_id, connection_id, sender)
            .await
    }

    pub fn leave(&self, paper_key: &str, user_id: &str, connection_id: Uuid) -> bool {
        self.connections.detach(paper_key, user_id, connection_id)
    }

    /// `submitAnswer`: returns whether the locked answer is correct.
    pub async fn submit(
        &self,
        paper_key: &str,
        user_id: &str,
        question_index: usize,
        option_id: usize,
    ) -> Result<bool, SessionError> {
        let session = self
            .registry
            .get(paper_key)
            .ok_or_else(|| SessionError::SessionUnavailable(paper_key.to_string()))?;
        let ctx = ledger::SubmitContext {
            store: self.store.as_ref(),
            clock: &self.clock,
            advance_when_all_answered: self.config.advance_when_all_answered,
        };
        ledger::submit(&ctx, &session, user_id, question_index, option_id).await
    }

    /// Records a focus-loss strike; never touches the timeline or answers.
    pub fn report_focus_loss(&self, paper_key: &str, user_id: &str) -> Result<Strike, SessionError> {
        let session = self
            .registry
            .get(paper_key)
            .ok_or_else(|| SessionError::SessionUnavailable(paper_key.to_string()))?;
        let strike = session.proctor.record_focus_loss(user_id);
        tracing::info!(
            "Focus lost by {} in {} (strike {}{})",
            user_id,
            paper_key,
            strike.strikes,
            if strike.flagged { ", flagged" } else { "" }
        );
        Ok(strike)
    }

    pub fn session(&self, paper_key: &str) -> Option<Arc<LiveSession>> {
        self.registry.get(paper_key)
    }

    pub fn sessions(&self) -> Vec<Arc<LiveSession>> {
        self.registry.sessions()
    }

    /// Ends every session and stops their loops.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

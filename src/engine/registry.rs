// src/engine/registry.rs

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::{
    config::EngineConfig,
    engine::{clock::SessionClock, scheduler::Scheduler, session::LiveSession},
    error::SessionError,
    store::{QuestionStore, StoreError},
};

type Slot = Arc<OnceCell<Arc<LiveSession>>>;

/// Maps each paper key to its one live session.
///
/// Creation is serialized per key through the slot's `OnceCell`: concurrent
/// first joins for the same key wait on a single Question Store load, while
/// other keys proceed untouched. A slot is only ever filled with a fully
/// built session.
pub struct SessionRegistry {
    sessions: DashMap<String, Slot>,
    store: Arc<dyn QuestionStore>,
    clock: SessionClock,
    config: EngineConfig,
    me: Weak<SessionRegistry>,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn QuestionStore>,
        clock: SessionClock,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            sessions: DashMap::new(),
            store,
            clock,
            config,
            me: me.clone(),
        })
    }

    /// Returns the live session for `paper_key`, creating it on first access.
    ///
    /// A non-empty `title` must match the paper's title; a mismatch fails before
    /// anything is registered.
    pub async fn get_or_create(
        &self,
        paper_key: &str,
        title: &str,
    ) -> Result<Arc<LiveSession>, SessionError> {
        let slot: Slot = self
            .sessions
            .entry(paper_key.to_string())
            .or_default()
            .value()
            .clone();

        let mut created = None;
        let created_ref = &mut created;
        let result = slot
            .get_or_try_init(|| async move {
                let (session, scheduler) = self.create(paper_key, title).await?;
                *created_ref = Some(scheduler);
                Ok::<_, SessionError>(session)
            })
            .await
            .cloned();

        // Spawned only once the session is reachable, so its retirement can find it.
        if let Some(scheduler) = created {
            tokio::spawn(scheduler.run());
        }

        if result.is_err() {
            // Forget the empty slot unless another caller is still waiting on it.
            self.sessions.remove_if(paper_key, |_, s| {
                Arc::ptr_eq(s, &slot) && !s.initialized() && Arc::strong_count(s) == 2
            });
        }

        result
    }

    /// The live session for `paper_key`, without creating one.
    pub fn get(&self, paper_key: &str) -> Option<Arc<LiveSession>> {
        self.sessions
            .get(paper_key)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn sessions(&self) -> Vec<Arc<LiveSession>> {
        self.sessions
            .iter()
            .filter_map(|slot| slot.value().get().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.iter().filter(|slot| slot.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retires an ended session. Called by its scheduler after the drain period.
    pub(crate) fn remove(&self, session: &Arc<LiveSession>) -> bool {
        self.sessions
            .remove_if(session.paper_key(), |_, slot| {
                slot.get().is_some_and(|s| Arc::ptr_eq(s, session))
            })
            .is_some()
    }

    /// Ends every live session.
    pub async fn shutdown(&self) {
        for session in self.sessions() {
            session.shutdown().await;
        }
    }

    async fn create(
        &self,
        paper_key: &str,
        title: &str,
    ) -> Result<(Arc<LiveSession>, Scheduler), SessionError> {
        let unavailable = || SessionError::SessionUnavailable(paper_key.to_string());

        let paper = self.store.load_paper(paper_key).await.map_err(|e| {
            match &e {
                StoreError::NotFound(_) => warn!("Join for unknown paper {}", paper_key),
                _ => error!("Question Store failed for {}: {}", paper_key, e),
            }
            unavailable()
        })?;

        if !title.is_empty() && title != paper.title {
            warn!("Join for {} rejected: title '{}' does not match", paper_key, title);
            return Err(unavailable());
        }

        if let Err(reason) = paper.check() {
            warn!("Refusing to run paper {}: {}", paper_key, reason);
            return Err(unavailable());
        }

        let (session, scheduler) = Scheduler::new(
            Arc::new(paper),
            self.clock.clone(),
            &self.config,
            self.me.clone(),
        );
        info!(
            "Session {} created ({} questions, status {})",
            paper_key,
            session.questions().len(),
            session.snapshot().status.as_str()
        );

        Ok((session, scheduler))
    }
}

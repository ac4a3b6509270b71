// src/engine/connection.rs

//! Connection Manager: binds participant connections to sessions, resyncs them
//! on (re)join and fans broadcasts out without letting one connection stall
//! the others.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    engine::{
        clock::{SessionClock, as_wire_seconds, remaining},
        lifecycle::{SessionSnapshot, SessionStatus},
        registry::SessionRegistry,
        session::LiveSession,
    },
    error::SessionError,
    models::{message::ServerMessage, question::PublicQuestion},
};

/// Per-connection outbound queue. Delivery never waits on it.
pub type Outbound = mpsc::Sender<Arc<ServerMessage>>;

/// One participant bound to one session through one live connection.
#[derive(Debug)]
pub struct Attachment {
    pub user_id: String,
    pub connection_id: Uuid,
    sender: Outbound,
    /// Last question index delivered to this connection.
    acked_index: Option<usize>,
}

impl Attachment {
    pub fn new(user_id: &str, connection_id: Uuid, sender: Outbound) -> Self {
        Self {
            user_id: user_id.to_string(),
            connection_id,
            sender,
            acked_index: None,
        }
    }

    fn deliver(
        &mut self,
        snapshot: &SessionSnapshot,
        message: Arc<ServerMessage>,
    ) -> Result<(), SessionError> {
        if let Err(err) = self.sender.try_send(message) {
            match err {
                TrySendError::Full(_) => warn!(
                    "Outbound queue full for {} ({}), dropping attachment",
                    self.user_id, self.connection_id
                ),
                TrySendError::Closed(_) => debug!(
                    "Connection {} of {} already closed",
                    self.connection_id, self.user_id
                ),
            }
            return Err(SessionError::DeliveryFailed);
        }
        if snapshot.status == SessionStatus::Running {
            self.acked_index = snapshot.current_question_index;
        }
        Ok(())
    }
}

/// Attachments of one session, at most one per user.
#[derive(Debug, Default)]
pub(crate) struct Roster {
    attachments: HashMap<String, Attachment>,
}

impl Roster {
    pub(crate) fn len(&self) -> usize {
        self.attachments.len()
    }

    pub(crate) fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.attachments.keys().map(String::as_str)
    }

    pub(crate) fn connection_of(&self, user_id: &str) -> Option<Uuid> {
        self.attachments.get(user_id).map(|a| a.connection_id)
    }

    /// Delivers the resync message, if any, and unless the session has ended
    /// keeps the attachment. Returns the connection id it replaced, if any.
    ///
    /// Without a message the attachment stays unacked, so the next broadcast
    /// reaches it.
    pub(crate) fn attach(
        &mut self,
        mut attachment: Attachment,
        snapshot: &SessionSnapshot,
        message: Option<Arc<ServerMessage>>,
    ) -> Result<Option<Uuid>, SessionError> {
        if let Some(message) = message {
            attachment.deliver(snapshot, message)?;
        }
        if snapshot.status == SessionStatus::Ended {
            return Err(SessionError::SessionEnded);
        }

        Ok(self
            .attachments
            .insert(attachment.user_id.clone(), attachment)
            .map(|prev| prev.connection_id))
    }

    /// Removes the user's attachment if it still belongs to `connection_id`.
    pub(crate) fn detach(&mut self, user_id: &str, connection_id: Uuid) -> bool {
        if self.connection_of(user_id) == Some(connection_id) {
            self.attachments.remove(user_id);
            true
        } else {
            false
        }
    }

    pub(crate) fn broadcast(&mut self, snapshot: &SessionSnapshot, message: Arc<ServerMessage>) {
        if snapshot.status == SessionStatus::Ended {
            for (_, mut attachment) in self.attachments.drain() {
                let _ = attachment.deliver(snapshot, message.clone());
            }
            return;
        }

        let mut failed = Vec::new();
        for attachment in self.attachments.values_mut() {
            if snapshot.status == SessionStatus::Running
                && attachment.acked_index >= snapshot.current_question_index
            {
                continue;
            }
            if attachment.deliver(snapshot, message.clone()).is_err() {
                failed.push(attachment.user_id.clone());
            }
        }
        for user_id in failed {
            self.attachments.remove(&user_id);
        }
    }
}

/// The message that brings a participant in line with `snapshot` at `now`.
pub(crate) fn sync_message(
    snapshot: &SessionSnapshot,
    questions: &[PublicQuestion],
    now: DateTime<Utc>,
) -> ServerMessage {
    match snapshot.status {
        SessionStatus::Pending => ServerMessage::Scheduled {
            start_time: snapshot.start_time,
            starts_in_seconds: as_wire_seconds(remaining(now, snapshot.start_time)),
        },
        SessionStatus::Running => {
            match (snapshot.current_question_index, snapshot.question_deadline) {
                (Some(index), Some(deadline)) if index < questions.len() => {
                    ServerMessage::Question {
                        question: questions[index].clone(),
                        question_index: index,
                        question_count: questions.len(),
                        remaining_time_seconds: as_wire_seconds(remaining(now, deadline)),
                    }
                }
                _ => ServerMessage::Error {
                    message: "session state unavailable".to_string(),
                },
            }
        }
        SessionStatus::Ended => ServerMessage::ExamEnd {},
    }
}

/// The resync for a participant attaching at `now`.
///
/// `None` while the snapshot is behind the clock: the live question has expired
/// (or the start time has passed) and the scheduler has not published the next
/// state yet. That publish is what the participant receives instead.
pub(crate) fn resync_message(
    snapshot: &SessionSnapshot,
    questions: &[PublicQuestion],
    now: DateTime<Utc>,
) -> Option<ServerMessage> {
    let behind = match snapshot.status {
        SessionStatus::Pending => now >= snapshot.start_time,
        SessionStatus::Running => snapshot.question_deadline.is_none_or(|d| now >= d),
        SessionStatus::Ended => false,
    };
    (!behind).then(|| sync_message(snapshot, questions, now))
}

pub struct ConnectionManager {
    registry: Arc<SessionRegistry>,
    clock: SessionClock,
}

impl ConnectionManager {
    pub fn new(registry: Arc<SessionRegistry>, clock: SessionClock) -> Self {
        Self { registry, clock }
    }

    /// Attaches a participant, creating the session if needed, and immediately
    /// sends them the current state with the server-computed remaining time.
    ///
    /// A second attach for the same user replaces the first.
    pub async fn attach(
        &self,
        paper_key: &str,
        title: &str,
        user_id: &str,
        connection_id: Uuid,
        sender: Outbound,
    ) -> Result<Arc<LiveSession>, SessionError> {
        let session = self.registry.get_or_create(paper_key, title).await?;

        // The session may already have been created by a join with the right title.
        if !title.is_empty() && title != session.title() {
            warn!(
                "Join for {} by {} rejected: title '{}' does not match",
                paper_key, user_id, title
            );
            return Err(SessionError::SessionUnavailable(paper_key.to_string()));
        }

        let replaced = {
            let mut roster = session.roster();
            let snapshot = session.snapshot();
            let message = resync_message(&snapshot, session.questions(), self.clock.now());
            roster.attach(
                Attachment::new(user_id, connection_id, sender),
                &snapshot,
                message.map(Arc::new),
            )?
        };

        match replaced {
            Some(prev) if prev != connection_id => info!(
                "User {} reattached to {} ({} replaces {})",
                user_id, paper_key, connection_id, prev
            ),
            _ => info!("User {} attached to {} ({})", user_id, paper_key, connection_id),
        }

        Ok(session)
    }

    /// Drops the attachment; answers already locked are kept.
    pub fn detach(&self, paper_key: &str, user_id: &str, connection_id: Uuid) -> bool {
        let Some(session) = self.registry.get(paper_key) else {
            return false;
        };
        let removed = session.roster().detach(user_id, connection_id);
        if removed {
            info!("User {} detached from {} ({})", user_id, paper_key, connection_id);
        }
        removed
    }
}

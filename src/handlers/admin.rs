// src/handlers/admin.rs

use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::{
    engine::ExamEngine, error::AppError, handlers::session::status_of,
    models::exam_record::SessionOverview,
};

/// Lists every live session with proctoring flags.
///
/// Read-only: administrators cannot move a session's timeline.
pub async fn list_sessions(
    State(engine): State<Arc<ExamEngine>>,
) -> Result<impl IntoResponse, AppError> {
    let mut sessions: Vec<SessionOverview> = engine
        .sessions()
        .iter()
        .map(|session| SessionOverview {
            status: status_of(session, engine.clock()),
            answers_locked: session.ledger.len(),
            strikes: session.proctor.counts(),
            flagged_participants: session.proctor.flagged(),
        })
        .collect();
    sessions.sort_by(|a, b| a.status.paper_key.cmp(&b.status.paper_key));

    Ok(Json(sessions))
}

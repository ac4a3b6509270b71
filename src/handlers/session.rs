// src/handlers/session.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    engine::{
        ExamEngine, LiveSession, SessionClock,
        clock::{as_wire_seconds, classify, remaining},
    },
    error::{AppError, SessionError},
    models::exam_record::{AnswerSheet, SessionStatusResponse},
    utils::jwt::Claims,
};

/// Builds the status view of a session as of now.
pub(crate) fn status_of(session: &LiveSession, clock: &SessionClock) -> SessionStatusResponse {
    let snapshot = session.snapshot();
    let now = clock.now();

    SessionStatusResponse {
        paper_key: snapshot.paper_key.clone(),
        title: snapshot.title.clone(),
        status: snapshot.status.as_str(),
        phase: classify(now, snapshot.start_time, snapshot.end_time),
        start_time: snapshot.start_time,
        end_time: snapshot.end_time,
        current_question_index: snapshot.current_index_or_minus_one(),
        question_count: snapshot.question_count,
        remaining_time_seconds: snapshot
            .question_deadline
            .map_or(0.0, |d| as_wire_seconds(remaining(now, d))),
        participants: session.participant_count(),
    }
}

fn live_session(engine: &ExamEngine, paper_key: &str) -> Result<Arc<LiveSession>, AppError> {
    engine
        .session(paper_key)
        .ok_or_else(|| SessionError::SessionUnavailable(paper_key.to_string()).into())
}

/// Current state of a live (or draining) session.
pub async fn get_session(
    State(engine): State<Arc<ExamEngine>>,
    Path(paper_key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = live_session(&engine, &paper_key)?;
    Ok(Json(status_of(&session, engine.clock())))
}

/// The caller's own locked answers, available until the session is retired.
pub async fn my_answers(
    State(engine): State<Arc<ExamEngine>>,
    Extension(claims): Extension<Claims>,
    Path(paper_key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = live_session(&engine, &paper_key)?;
    let records = session.answers_of(&claims.sub);

    Ok(Json(AnswerSheet::new(&paper_key, &claims.sub, records)))
}

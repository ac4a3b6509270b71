// src/models/exam_record.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::clock::ExamPhase;

/// A participant's locked answer to one question.
/// Presence in the ledger means the record is locked; it is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub option_id: usize,
    pub correct: bool,
    pub points: u32,
    pub locked_at: DateTime<Utc>,
}

/// One row of a participant's answer sheet.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsweredQuestion {
    pub question_index: usize,
    pub option_id: usize,
    pub correct: bool,
    pub points: u32,
}

/// DTO returned for a participant's own result query.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSheet {
    pub paper_key: String,
    pub user_id: String,
    pub answers: Vec<AnsweredQuestion>,
    pub total_points: u32,
}

impl AnswerSheet {
    pub fn new(paper_key: &str, user_id: &str, records: Vec<(usize, AnswerRecord)>) -> Self {
        let answers: Vec<AnsweredQuestion> = records
            .into_iter()
            .map(|(question_index, r)| AnsweredQuestion {
                question_index,
                option_id: r.option_id,
                correct: r.correct,
                points: r.points,
            })
            .collect();
        let total_points = answers.iter().map(|a| a.points).sum();

        Self {
            paper_key: paper_key.to_string(),
            user_id: user_id.to_string(),
            answers,
            total_points,
        }
    }
}

/// Status view of a live session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub paper_key: String,
    pub title: String,
    pub status: &'static str,
    pub phase: ExamPhase,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// -1 before the first question goes live.
    pub current_question_index: i64,
    pub question_count: usize,
    pub remaining_time_seconds: f64,
    pub participants: usize,
}

/// Admin listing row: status plus proctoring flags.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOverview {
    #[serde(flatten)]
    pub status: SessionStatusResponse,
    pub answers_locked: usize,
    /// Focus-loss strikes per participant.
    pub strikes: BTreeMap<String, u32>,
    pub flagged_participants: Vec<String>,
}

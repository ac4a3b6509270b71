// src/models/message.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::PublicQuestion;

static PAPER_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("paper key pattern"));

fn validate_paper_key(key: &str) -> Result<(), validator::ValidationError> {
    if PAPER_KEY.is_match(key) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_paper_key"))
    }
}

/// Frames a client may send over the exam socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Join(JoinRequest),
    SubmitAnswer(SubmitAnswerRequest),
    FocusLost(PaperRef),
    Leave(PaperRef),
}

impl ClientMessage {
    pub fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            ClientMessage::Join(req) => req.validate(),
            ClientMessage::SubmitAnswer(req) => req.validate(),
            ClientMessage::FocusLost(req) | ClientMessage::Leave(req) => req.validate(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[validate(custom(function = validate_paper_key))]
    pub paper_key: String,

    /// Optional; when present it must match the paper's title.
    #[serde(default)]
    #[validate(length(max = 200))]
    pub title: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    #[validate(custom(function = validate_paper_key))]
    pub paper_key: String,
    pub question_index: usize,
    pub option_id: usize,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaperRef {
    #[validate(custom(function = validate_paper_key))]
    pub paper_key: String,
}

/// Frames the server sends to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// The live question with the server-computed time left on it.
    Question {
        question: PublicQuestion,
        question_index: usize,
        question_count: usize,
        remaining_time_seconds: f64,
    },
    /// Terminal notice. Nothing else follows for this session.
    ExamEnd {},
    AnswerResult {
        question_index: usize,
        accepted: bool,
        correct: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Sent to participants that attach before the exam starts.
    Scheduled {
        start_time: DateTime<Utc>,
        starts_in_seconds: f64,
    },
    ProctorWarning {
        strikes: u32,
        flagged: bool,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join","paperKey":"PHY-101","title":"Physics"}"#)
                .unwrap();
        match msg {
            ClientMessage::Join(req) => {
                assert_eq!(req.paper_key, "PHY-101");
                assert_eq!(req.title, "Physics");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn join_title_is_optional() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join","paperKey":"PHY-101"}"#).unwrap();
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn parses_submit_answer() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"submitAnswer","paperKey":"PHY-101","questionIndex":2,"optionId":1}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::SubmitAnswer(req) => {
                assert_eq!(req.question_index, 2);
                assert_eq!(req.option_id, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_paper_key() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"leave","paperKey":"../etc/passwd"}"#).unwrap();
        assert!(msg.validate().is_err());
    }

    #[test]
    fn exam_end_serializes_as_bare_tag() {
        let json = serde_json::to_value(ServerMessage::ExamEnd {}).unwrap();
        assert_eq!(json, serde_json::json!({"type": "examEnd"}));
    }

    #[test]
    fn answer_result_uses_camel_case() {
        let json = serde_json::to_value(ServerMessage::AnswerResult {
            question_index: 0,
            accepted: false,
            correct: None,
            reason: Some("duplicate submission".to_string()),
        })
        .unwrap();
        assert_eq!(json["type"], "answerResult");
        assert_eq!(json["questionIndex"], 0);
        assert_eq!(json["correct"], serde_json::Value::Null);
    }
}

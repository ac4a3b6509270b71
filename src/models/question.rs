// src/models/question.rs

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::html::clean_html;

fn default_points() -> u32 {
    1
}

/// One answer choice of a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub text: String,

    /// Never sent to participants.
    pub is_correct: bool,
}

/// A multiple-choice question as supplied by the Question Store.
/// Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,

    #[validate(length(min = 1, max = 1000))]
    pub text: String,

    /// Answer choices in display order. The option id is its position in this list.
    #[validate(custom(function = validate_options))]
    pub options: Vec<QuestionOption>,

    #[validate(range(min = 1))]
    pub time_limit_seconds: u32,

    /// Points awarded for a correct answer.
    #[serde(default = "default_points")]
    pub max_points: u32,
}

impl Question {
    pub fn time_limit(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.time_limit_seconds))
    }

    /// Position of the first option flagged correct.
    pub fn correct_option(&self) -> Option<usize> {
        self.options.iter().position(|o| o.is_correct)
    }

    /// Builds the participant-facing view: correctness stripped, text sanitized.
    pub fn to_public(&self) -> PublicQuestion {
        PublicQuestion {
            id: self.id.clone(),
            text: clean_html(&self.text),
            options: self
                .options
                .iter()
                .enumerate()
                .map(|(id, o)| PublicOption {
                    id,
                    text: clean_html(&o.text),
                })
                .collect(),
            time_limit_seconds: self.time_limit_seconds,
            max_points: self.max_points,
        }
    }
}

fn validate_options(options: &[QuestionOption]) -> Result<(), validator::ValidationError> {
    if options.len() < 2 {
        return Err(validator::ValidationError::new("at_least_two_options"));
    }
    if !options.iter().any(|o| o.is_correct) {
        return Err(validator::ValidationError::new("no_correct_option"));
    }
    for opt in options {
        if opt.text.is_empty() || opt.text.len() > 500 {
            return Err(validator::ValidationError::new("option_text_length"));
        }
    }
    Ok(())
}

/// DTO for sending a question to participants (no correctness flags).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<PublicOption>,
    pub time_limit_seconds: u32,
    pub max_points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicOption {
    pub id: usize,
    pub text: String,
}

/// A question paper: the questions and timing of one exam offering.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub paper_key: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    #[validate(nested)]
    pub questions: Vec<Question>,
}

impl Paper {
    /// Rejects papers a session cannot be run from.
    pub fn check(&self) -> Result<(), String> {
        if self.questions.is_empty() {
            return Err(format!("paper '{}' has no questions", self.paper_key));
        }
        if self.end_time <= self.start_time {
            return Err(format!(
                "paper '{}' ends at or before its start time",
                self.paper_key
            ));
        }
        self.validate().map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(options: Vec<QuestionOption>) -> Question {
        Question {
            id: "q1".to_string(),
            text: "Which planet is known as the Red Planet?".to_string(),
            options,
            time_limit_seconds: 30,
            max_points: 2,
        }
    }

    fn opt(text: &str, is_correct: bool) -> QuestionOption {
        QuestionOption {
            text: text.to_string(),
            is_correct,
        }
    }

    #[test]
    fn public_question_hides_correctness() {
        let q = question(vec![opt("Venus", false), opt("Mars", true)]);
        let public = serde_json::to_value(q.to_public()).unwrap();

        assert_eq!(public["options"][1]["id"], 1);
        assert_eq!(public["options"][1]["text"], "Mars");
        assert!(public["options"][1].get("isCorrect").is_none());
        assert!(!public.to_string().contains("isCorrect"));
    }

    #[test]
    fn public_question_strips_script_tags() {
        let mut q = question(vec![opt("<script>alert(1)</script>Venus", false), opt("Mars", true)]);
        q.text = "<b>Pick</b><script>steal()</script>".to_string();
        let public = q.to_public();

        assert_eq!(public.text, "<b>Pick</b>");
        assert_eq!(public.options[0].text, "Venus");
    }

    #[test]
    fn correct_option_is_position() {
        let q = question(vec![opt("Venus", false), opt("Mars", true), opt("Jupiter", false)]);
        assert_eq!(q.correct_option(), Some(1));
    }

    #[test]
    fn question_without_correct_option_is_invalid() {
        let q = question(vec![opt("Venus", false), opt("Mars", false)]);
        assert!(q.validate().is_err());
    }

    #[test]
    fn paper_check_rejects_inverted_window() {
        let now = Utc::now();
        let paper = Paper {
            paper_key: "k1".to_string(),
            title: "Astronomy".to_string(),
            start_time: now,
            end_time: now - TimeDelta::seconds(1),
            questions: vec![question(vec![opt("Venus", false), opt("Mars", true)])],
        };
        assert!(paper.check().is_err());
    }

    #[test]
    fn max_points_defaults_to_one() {
        let q: Question = serde_json::from_value(serde_json::json!({
            "id": "q9",
            "text": "2 + 2",
            "options": [{"text": "4", "isCorrect": true}, {"text": "5", "isCorrect": false}],
            "timeLimitSeconds": 20
        }))
        .unwrap();
        assert_eq!(q.max_points, 1);
        assert_eq!(q.time_limit(), TimeDelta::seconds(20));
    }
}

// src/store/mod.rs

//! Question Store: the external source of papers and answer keys.
//!
//! The engine only reads from it. Two implementations ship with the crate:
//! [`PgQuestionStore`] for deployments and [`InMemoryQuestionStore`] for tests
//! and embedding.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::question::Paper;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryQuestionStore;
pub use postgres::PgQuestionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("paper '{0}' not found")]
    NotFound(String),

    #[error("question {index} of paper '{paper_key}' has no correct option")]
    NoCorrectOption { paper_key: String, index: usize },

    #[error("question store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Loads a paper with its ordered questions and schedule.
    async fn load_paper(&self, paper_key: &str) -> Result<Paper, StoreError>;

    /// Authoritative correct option id for one question.
    async fn correct_option(&self, paper_key: &str, question_index: usize)
    -> Result<usize, StoreError>;
}

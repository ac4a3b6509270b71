// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, prelude::FromRow, types::Json};

use super::{QuestionStore, StoreError};
use crate::models::question::{Paper, Question};

/// Represents the 'question_papers' table in the database.
#[derive(Debug, FromRow)]
struct PaperRow {
    paper_key: String,
    title: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,

    /// Ordered questions stored as a JSONB array.
    questions: Json<Vec<Question>>,
}

impl From<PaperRow> for Paper {
    fn from(row: PaperRow) -> Self {
        Paper {
            paper_key: row.paper_key,
            title: row.title,
            start_time: row.start_time,
            end_time: row.end_time,
            questions: row.questions.0,
        }
    }
}

/// Question Store backed by Postgres.
#[derive(Clone)]
pub struct PgQuestionStore {
    pool: PgPool,
}

impl PgQuestionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionStore for PgQuestionStore {
    async fn load_paper(&self, paper_key: &str) -> Result<Paper, StoreError> {
        let row = sqlx::query_as::<_, PaperRow>(
            r#"
            SELECT paper_key, title, start_time, end_time, questions
            FROM question_papers
            WHERE paper_key = $1
            "#,
        )
        .bind(paper_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load paper {}: {:?}", paper_key, e);
            StoreError::from(e)
        })?;

        row.map(Paper::from)
            .ok_or_else(|| StoreError::NotFound(paper_key.to_string()))
    }

    async fn correct_option(
        &self,
        paper_key: &str,
        question_index: usize,
    ) -> Result<usize, StoreError> {
        let no_answer = || StoreError::NoCorrectOption {
            paper_key: paper_key.to_string(),
            index: question_index,
        };
        let index = i32::try_from(question_index).map_err(|_| no_answer())?;

        let row: Option<(Option<Json<Question>>,)> = sqlx::query_as(
            r#"
            SELECT questions -> $2
            FROM question_papers
            WHERE paper_key = $1
            "#,
        )
        .bind(paper_key)
        .bind(index)
        .fetch_optional(&self.pool)
        .await?;

        let (question,) = row.ok_or_else(|| StoreError::NotFound(paper_key.to_string()))?;
        question
            .and_then(|Json(q)| q.correct_option())
            .ok_or_else(no_answer)
    }
}

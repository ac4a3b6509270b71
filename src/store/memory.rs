// src/store/memory.rs

use async_trait::async_trait;
use dashmap::DashMap;

use super::{QuestionStore, StoreError};
use crate::models::question::Paper;

/// Question Store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryQuestionStore {
    papers: DashMap<String, Paper>,
}

impl InMemoryQuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a paper.
    pub fn insert(&self, paper: Paper) {
        self.papers.insert(paper.paper_key.clone(), paper);
    }

    /// Loads papers from a JSON array, e.g. a seed file.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let papers: Vec<Paper> = serde_json::from_str(json)?;
        let store = Self::new();
        for paper in papers {
            store.insert(paper);
        }
        Ok(store)
    }
}

#[async_trait]
impl QuestionStore for InMemoryQuestionStore {
    async fn load_paper(&self, paper_key: &str) -> Result<Paper, StoreError> {
        self.papers
            .get(paper_key)
            .map(|p| p.value().clone())
            .ok_or_else(|| StoreError::NotFound(paper_key.to_string()))
    }

    async fn correct_option(
        &self,
        paper_key: &str,
        question_index: usize,
    ) -> Result<usize, StoreError> {
        let paper = self
            .papers
            .get(paper_key)
            .ok_or_else(|| StoreError::NotFound(paper_key.to_string()))?;

        paper
            .questions
            .get(question_index)
            .and_then(|q| q.correct_option())
            .ok_or_else(|| StoreError::NoCorrectOption {
                paper_key: paper_key.to_string(),
                index: question_index,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"[{
        "paperKey": "GEO-1",
        "title": "Geography",
        "startTime": "2026-01-01T10:00:00Z",
        "endTime": "2026-01-01T11:00:00Z",
        "questions": [{
            "id": "q1",
            "text": "Capital of France?",
            "options": [
                {"text": "London", "isCorrect": false},
                {"text": "Paris", "isCorrect": true}
            ],
            "timeLimitSeconds": 30
        }]
    }]"#;

    #[tokio::test]
    async fn loads_seeded_paper() {
        let store = InMemoryQuestionStore::from_json(SEED).unwrap();
        let paper = store.load_paper("GEO-1").await.unwrap();

        assert_eq!(paper.title, "Geography");
        assert_eq!(paper.questions.len(), 1);
        assert_eq!(store.correct_option("GEO-1", 0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_paper_is_not_found() {
        let store = InMemoryQuestionStore::new();
        assert!(matches!(
            store.load_paper("nope").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn out_of_range_question_has_no_answer() {
        let store = InMemoryQuestionStore::from_json(SEED).unwrap();
        assert!(matches!(
            store.correct_option("GEO-1", 5).await,
            Err(StoreError::NoCorrectOption { index: 5, .. })
        ));
    }
}

// src/models/score.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{
    catalog::{DimensionView, TestView},
    language::Language,
};

/// Represents the 'results' table in the database.
/// Unique per (session_id, test_id, domain_id); rescoring overwrites the score.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub test_id: Uuid,
    pub domain_id: Uuid,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

/// Upsert payload for one domain score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewResult {
    pub session_id: Uuid,
    pub test_id: Uuid,
    pub domain_id: Uuid,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetScore {
    pub facet: DimensionView,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainScore {
    pub domain: DimensionView,
    pub score: f64,

    /// Number of responses that went into the score; 0 means the neutral default.
    pub answered: usize,

    pub facet_scores: Vec<FacetScore>,
}

/// Full outcome of a completed attempt, as shown on the results page.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreReport {
    pub test: TestView,
    pub domain_results: Vec<DomainScore>,
    pub session_token: String,

    /// False if at least one domain score could not be written.
    pub persisted: bool,
}

/// DTO for requesting the final scores.
#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub test_id: Uuid,
    #[serde(default)]
    pub lang: Language,
}

/// Query parameters for re-reading stored scores.
#[derive(Debug, Deserialize)]
pub struct StoredResultsParams {
    pub test_id: Uuid,
    #[serde(default)]
    pub lang: Language,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoredResult {
    pub domain: DimensionView,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

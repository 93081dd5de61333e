// src/handlers/quiz.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use validator::Validate;

use super::checked_token;
use crate::{
    error::AppError,
    models::{
        response::{RecordResponsesRequest, RecordResponsesResponse},
        score::{ScoreRequest, StoredResultsParams},
    },
    quiz::QuizService,
};

/// Records the answers of one question page.
pub async fn record_responses(
    State(quiz): State<QuizService>,
    Path(token): Path<String>,
    Json(payload): Json<RecordResponsesRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = checked_token(&token)?;
    payload.validate()?;

    let outcome = quiz
        .recorder
        .record(token, payload.test_id, payload.page, &payload.likert_values())
        .await?;

    Ok(Json(RecordResponsesResponse {
        recorded: outcome.recorded,
        persisted: outcome.persisted,
    }))
}

/// Computes, stores and returns the per-domain scores.
pub async fn score(
    State(quiz): State<QuizService>,
    Path(token): Path<String>,
    Json(payload): Json<ScoreRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = checked_token(&token)?;
    let report = quiz
        .scorer
        .score(token, payload.test_id, payload.lang)
        .await?;

    Ok(Json(report))
}

pub async fn stored_results(
    State(quiz): State<QuizService>,
    Path(token): Path<String>,
    Query(params): Query<StoredResultsParams>,
) -> Result<impl IntoResponse, AppError> {
    let token = checked_token(&token)?;
    let results = quiz
        .scorer
        .stored_results(token, params.test_id, params.lang)
        .await?;

    Ok(Json(results))
}

/// Flushes writes staged during an outage into the store.
pub async fn replay(
    State(quiz): State<QuizService>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let token = checked_token(&token)?;
    Ok(Json(quiz.replayer.replay(token).await))
}

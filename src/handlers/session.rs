// src/handlers/session.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use super::checked_token;
use crate::{
    error::AppError,
    models::session::{CreateSessionRequest, CreateSessionResponse, DemographicsRequest},
    quiz::QuizService,
};

/// Opens a quiz session. Always answers with a token, even when the store is down.
pub async fn create_session(
    State(quiz): State<QuizService>,
    payload: Option<Json<CreateSessionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.unwrap_or_default();
    payload.validate()?;

    let created = quiz
        .sessions
        .create(payload.language, payload.session_token)
        .await;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_token: created.session_token,
            language: payload.language,
            persisted: created.persisted,
        }),
    ))
}

/// Stores the demographics form on the session. Requires consent.
pub async fn update_demographics(
    State(quiz): State<QuizService>,
    Path(token): Path<String>,
    Json(payload): Json<DemographicsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = checked_token(&token)?;
    payload.validate()?;

    let consent = payload.consent;
    let persisted = quiz
        .sessions
        .update_demographics(token, consent, payload.into_demographics())
        .await?;

    Ok(Json(json!({ "persisted": persisted })))
}

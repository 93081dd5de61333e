// src/handlers/catalog.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        catalog::{DimensionView, QuestionPageParams, QuestionsPageResponse, TestView},
        language::LangParams,
    },
    quiz::QuizService,
};

/// Lists active tests, newest first. An unreachable store yields an empty list.
pub async fn list_tests(
    State(quiz): State<QuizService>,
    Query(params): Query<LangParams>,
) -> Result<impl IntoResponse, AppError> {
    let tests: Vec<TestView> = quiz
        .catalog
        .list_active_tests(params.lang)
        .await
        .iter()
        .map(|t| TestView::localize(t, params.lang))
        .collect();

    Ok(Json(tests))
}

/// Retrieves a single test by ID.
pub async fn get_test(
    State(quiz): State<QuizService>,
    Path(id): Path<Uuid>,
    Query(params): Query<LangParams>,
) -> Result<impl IntoResponse, AppError> {
    let test = quiz.catalog.get_test(id).await?;
    Ok(Json(TestView::localize(&test, params.lang)))
}

pub async fn list_domains(
    State(quiz): State<QuizService>,
    Path(test_id): Path<Uuid>,
    Query(params): Query<LangParams>,
) -> Result<impl IntoResponse, AppError> {
    let domains: Vec<DimensionView> = quiz
        .catalog
        .list_domains(test_id)
        .await
        .iter()
        .map(|d| DimensionView::from_domain(d, params.lang))
        .collect();

    Ok(Json(domains))
}

pub async fn list_facets(
    State(quiz): State<QuizService>,
    Path(domain_id): Path<Uuid>,
    Query(params): Query<LangParams>,
) -> Result<impl IntoResponse, AppError> {
    let facets: Vec<DimensionView> = quiz
        .catalog
        .list_facets(domain_id)
        .await
        .iter()
        .map(|f| DimensionView::from_facet(f, params.lang))
        .collect();

    Ok(Json(facets))
}

/// Returns one page of questions. The reverse-keyed flag is never exposed.
pub async fn questions_page(
    State(quiz): State<QuizService>,
    Path(test_id): Path<Uuid>,
    Query(params): Query<QuestionPageParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = quiz.catalog.questions_page(test_id, params.page).await;
    Ok(Json(QuestionsPageResponse::localize(&page, params.lang)))
}

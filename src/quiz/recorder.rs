// src/quiz/recorder.rs

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use uuid::Uuid;

use super::{catalog::CatalogReader, pager::page_window, session::SessionResolver};
use crate::{
    error::AppError,
    fallback::{FallbackKey, FallbackStore, StagedEntry},
    models::response::{LikertValue, NewResponse},
    store::ResponseRepository,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    pub recorded: usize,
    pub persisted: bool,
}

/// Persists one page of Likert answers per call.
#[derive(Clone)]
pub struct ResponseRecorder {
    resolver: SessionResolver,
    catalog: CatalogReader,
    responses: Arc<dyn ResponseRepository>,
    fallback: Arc<dyn FallbackStore>,
}

impl ResponseRecorder {
    pub fn new(
        resolver: SessionResolver,
        catalog: CatalogReader,
        responses: Arc<dyn ResponseRepository>,
        fallback: Arc<dyn FallbackStore>,
    ) -> Self {
        Self {
            resolver,
            catalog,
            responses,
            fallback,
        }
    }

    /// Records `answers` (question id -> value) for the session behind `token`.
    ///
    /// When `page` is given, every question on that page must be answered.
    /// A failed write stages the answers in the fallback store instead of
    /// failing the request.
    pub async fn record(
        &self,
        token: &str,
        test_id: Uuid,
        page: Option<u32>,
        answers: &HashMap<Uuid, LikertValue>,
    ) -> Result<RecordOutcome, AppError> {
        if answers.is_empty() {
            return Err(AppError::BadRequest("No answers submitted".to_string()));
        }

        self.check_against_catalog(test_id, page, answers).await?;

        let session = self.resolver.resolve(token, None).await;
        if !session.is_persisted() {
            tracing::warn!("Session not persisted, staging responses locally");
            self.stage(token, test_id, answers);
            return Ok(RecordOutcome {
                recorded: answers.len(),
                persisted: false,
            });
        }

        let mut rows: Vec<NewResponse> = answers
            .iter()
            .map(|(question_id, value)| NewResponse {
                session_id: session.id,
                test_id,
                question_id: *question_id,
                value: *value,
            })
            .collect();
        rows.sort_by_key(|r| r.question_id);

        match self.responses.insert_responses(&rows).await {
            Ok(written) => {
                tracing::debug!(session_id = %session.id, written, "Saved responses");
                self.unstage(token, &rows);
                Ok(RecordOutcome {
                    recorded: rows.len(),
                    persisted: true,
                })
            }
            Err(e) => {
                tracing::error!("Error saving responses: {}", e);
                self.stage(token, test_id, answers);
                Ok(RecordOutcome {
                    recorded: rows.len(),
                    persisted: false,
                })
            }
        }
    }

    /// Rejects answers to questions outside the test and incomplete pages.
    /// Skipped when the catalog cannot be read.
    async fn check_against_catalog(
        &self,
        test_id: Uuid,
        page: Option<u32>,
        answers: &HashMap<Uuid, LikertValue>,
    ) -> Result<(), AppError> {
        let questions = match self.catalog.all_questions(test_id).await {
            Ok(questions) => questions,
            Err(e) => {
                tracing::warn!(%test_id, "Skipping answer checks, catalog unavailable: {}", e);
                return Ok(());
            }
        };

        let known: HashSet<Uuid> = questions.iter().map(|q| q.id).collect();
        let mut unknown: Vec<Uuid> = answers
            .keys()
            .filter(|id| !known.contains(id))
            .copied()
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            return Err(AppError::BadRequest(format!(
                "Questions do not belong to this test: {}",
                join_ids(&unknown)
            )));
        }

        if let Some(page_index) = page {
            let window = page_window(
                questions.len() as i64,
                page_index,
                self.catalog.page_size(),
            );
            let missing: Vec<Uuid> = questions
                .iter()
                .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
                .take(usize::try_from(window.limit).unwrap_or(usize::MAX))
                .map(|q| q.id)
                .filter(|id| !answers.contains_key(id))
                .collect();
            if !missing.is_empty() {
                return Err(AppError::BadRequest(format!(
                    "Please answer all questions on this page. Missing: {}",
                    join_ids(&missing)
                )));
            }
        }

        Ok(())
    }

    /// Answers staged earlier for the same questions are superseded by `rows`.
    fn unstage(&self, token: &str, rows: &[NewResponse]) {
        let key = FallbackKey::responses(token);
        for row in rows {
            self.fallback.unstage(
                &key,
                &StagedEntry::Response {
                    test_id: row.test_id,
                    question_id: row.question_id,
                    value: row.value,
                },
            );
        }
    }

    fn stage(&self, token: &str, test_id: Uuid, answers: &HashMap<Uuid, LikertValue>) {
        let key = FallbackKey::responses(token);
        for (question_id, value) in answers {
            self.fallback.stage(
                &key,
                StagedEntry::Response {
                    test_id,
                    question_id: *question_id,
                    value: *value,
                },
            );
        }
    }
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// src/quiz/catalog.rs

use std::sync::Arc;

use uuid::Uuid;

use super::pager::page_window;
use crate::{
    error::AppError,
    models::{
        catalog::{Domain, Facet, Question, QuestionsPage, Test},
        language::Language,
    },
    store::{CatalogRepository, StoreError},
};

/// Read-only access to tests, domains, facets and questions.
///
/// List reads degrade to empty results when the store fails: "no tests
/// available" is a state the client can display.
#[derive(Clone)]
pub struct CatalogReader {
    catalog: Arc<dyn CatalogRepository>,
    page_size: u32,
}

impl CatalogReader {
    pub fn new(catalog: Arc<dyn CatalogRepository>, page_size: u32) -> Self {
        Self {
            catalog,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub async fn list_active_tests(&self, lang: Language) -> Vec<Test> {
        match self.catalog.active_tests().await {
            Ok(tests) => tests,
            Err(e) => {
                tracing::warn!(%lang, "Failed to fetch active tests: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn get_test(&self, test_id: Uuid) -> Result<Test, AppError> {
        self.catalog
            .test(test_id)
            .await
            .map_err(|e| {
                tracing::error!(%test_id, "Failed to fetch test: {}", e);
                AppError::from(e)
            })?
            .ok_or_else(|| AppError::NotFound("Test not found".to_string()))
    }

    pub async fn list_domains(&self, test_id: Uuid) -> Vec<Domain> {
        match self.catalog.domains(test_id).await {
            Ok(domains) => domains,
            Err(e) => {
                tracing::warn!(%test_id, "Failed to fetch domains: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn list_facets(&self, domain_id: Uuid) -> Vec<Facet> {
        match self.catalog.facets(domain_id).await {
            Ok(facets) => facets,
            Err(e) => {
                tracing::warn!(%domain_id, "Failed to fetch facets: {}", e);
                Vec::new()
            }
        }
    }

    /// Every question of a test in display order, without the degrade-to-empty
    /// behaviour, so callers can tell "no questions" from "store down".
    pub async fn all_questions(&self, test_id: Uuid) -> Result<Vec<Question>, StoreError> {
        self.catalog.questions(test_id, 0, None).await
    }

    /// One 0-based page of questions; past the last page the slice is empty.
    pub async fn questions_page(&self, test_id: Uuid, page_index: u32) -> QuestionsPage {
        match self.try_questions_page(test_id, page_index).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(%test_id, page_index, "Failed to fetch question page: {}", e);
                QuestionsPage {
                    questions: Vec::new(),
                    page_index,
                    total_pages: 0,
                }
            }
        }
    }

    async fn try_questions_page(
        &self,
        test_id: Uuid,
        page_index: u32,
    ) -> Result<QuestionsPage, StoreError> {
        let total = self.catalog.count_questions(test_id).await?;
        let window = page_window(total, page_index, self.page_size);

        let questions = if window.is_past_end() {
            Vec::new()
        } else {
            self.catalog
                .questions(test_id, window.offset, Some(window.limit))
                .await?
        };

        Ok(QuestionsPage {
            questions,
            page_index,
            total_pages: window.total_pages,
        })
    }
}

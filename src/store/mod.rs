// src/store/mod.rs

//! Storage seams for the quiz flow.
//!
//! The quiz logic only talks to these traits. `postgres` backs them with a
//! sqlx pool; `memory` keeps everything in process and can simulate outages.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    catalog::{Domain, Facet, Question, Test},
    response::{NewResponse, Response},
    score::{NewResult, ResultRecord},
    session::{Demographics, NewSession, UserSession},
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    /// Unique key violation (e.g. a session token that already exists).
    #[error("conflict")]
    Conflict,

    /// Foreign key or check constraint rejected the write.
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("23505") => StoreError::Conflict,
                Some("23503") | Some("23514") => StoreError::Constraint(db.message().to_string()),
                _ => StoreError::Unavailable(err.to_string()),
            },
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Internal id of the session owning `token`, if any.
    async fn find_session_id(&self, token: &str) -> Result<Option<Uuid>, StoreError>;

    async fn find_session(&self, token: &str) -> Result<Option<UserSession>, StoreError>;

    /// Inserts a session row and returns its generated id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the token is already taken.
    async fn insert_session(&self, session: &NewSession) -> Result<Uuid, StoreError>;

    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no row has this id.
    async fn update_demographics(&self, id: Uuid, data: &Demographics) -> Result<(), StoreError>;

    async fn update_demographics_by_token(
        &self,
        token: &str,
        data: &Demographics,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Active tests, newest first.
    async fn active_tests(&self) -> Result<Vec<Test>, StoreError>;

    async fn test(&self, id: Uuid) -> Result<Option<Test>, StoreError>;

    /// Domains of a test by display order.
    async fn domains(&self, test_id: Uuid) -> Result<Vec<Domain>, StoreError>;

    /// Facets of a domain by display order.
    async fn facets(&self, domain_id: Uuid) -> Result<Vec<Facet>, StoreError>;

    async fn count_questions(&self, test_id: Uuid) -> Result<i64, StoreError>;

    /// Questions of a test by display order, starting at `offset`.
    /// `limit = None` returns the rest of the list.
    async fn questions(
        &self,
        test_id: Uuid,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Question>, StoreError>;
}

#[async_trait]
pub trait ResponseRepository: Send + Sync {
    /// Appends all rows in one statement; either every row is written or none.
    async fn insert_responses(&self, rows: &[NewResponse]) -> Result<u64, StoreError>;

    async fn responses(&self, session_id: Uuid, test_id: Uuid)
    -> Result<Vec<Response>, StoreError>;
}

#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Writes the score for (session, test, domain), replacing an earlier one.
    async fn upsert_result(&self, result: &NewResult) -> Result<(), StoreError>;

    async fn results(&self, session_id: Uuid, test_id: Uuid)
    -> Result<Vec<ResultRecord>, StoreError>;
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub responses: Arc<dyn ResponseRepository>,
    pub results: Arc<dyn ResultRepository>,
}

impl Storage {
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            sessions: store.clone(),
            catalog: store.clone(),
            responses: store.clone(),
            results: store,
        }
    }

    pub fn in_memory(store: InMemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            sessions: store.clone(),
            catalog: store.clone(),
            responses: store.clone(),
            results: store,
        }
    }
}

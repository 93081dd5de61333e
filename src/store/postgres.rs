// src/store/postgres.rs

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    CatalogRepository, ResponseRepository, ResultRepository, SessionRepository, StoreError,
};
use crate::models::{
    catalog::{Domain, Facet, Question, Test},
    response::{NewResponse, Response},
    score::{NewResult, ResultRecord},
    session::{Demographics, NewSession, UserSession},
};

/// Postgres-backed implementation of every repository trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn find_session_id(&self, token: &str) -> Result<Option<Uuid>, StoreError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM user_sessions WHERE session_token = $1 LIMIT 1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_session(&self, token: &str) -> Result<Option<UserSession>, StoreError> {
        let session = sqlx::query_as::<_, UserSession>(
            r#"
            SELECT
                id, session_token, language, age_group, gender, salary,
                leadership, previously_taken, created_at
            FROM user_sessions
            WHERE session_token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn insert_session(&self, session: &NewSession) -> Result<Uuid, StoreError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO user_sessions (session_token, language, previously_taken)
            VALUES ($1, $2, FALSE)
            RETURNING id
            "#,
        )
        .bind(&session.session_token)
        .bind(session.language.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update_demographics(&self, id: Uuid, data: &Demographics) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET age_group = $1, gender = $2, salary = $3, leadership = $4, previously_taken = $5
            WHERE id = $6
            "#,
        )
        .bind(&data.age_group)
        .bind(&data.gender)
        .bind(&data.salary)
        .bind(&data.leadership)
        .bind(data.previously_taken)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_demographics_by_token(
        &self,
        token: &str,
        data: &Demographics,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET age_group = $1, gender = $2, salary = $3, leadership = $4, previously_taken = $5
            WHERE session_token = $6
            "#,
        )
        .bind(&data.age_group)
        .bind(&data.gender)
        .bind(&data.salary)
        .bind(&data.leadership)
        .bind(data.previously_taken)
        .bind(token)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for PgStore {
    async fn active_tests(&self) -> Result<Vec<Test>, StoreError> {
        let tests = sqlx::query_as::<_, Test>(
            r#"
            SELECT id, name_en, name_de, description_en, description_de, active, created_at, updated_at
            FROM tests
            WHERE active = TRUE
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tests)
    }

    async fn test(&self, id: Uuid) -> Result<Option<Test>, StoreError> {
        let test = sqlx::query_as::<_, Test>(
            r#"
            SELECT id, name_en, name_de, description_en, description_de, active, created_at, updated_at
            FROM tests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(test)
    }

    async fn domains(&self, test_id: Uuid) -> Result<Vec<Domain>, StoreError> {
        let domains = sqlx::query_as::<_, Domain>(
            r#"
            SELECT
                id, test_id, name_en, name_de, description_en, description_de,
                display_order, created_at, updated_at
            FROM domains
            WHERE test_id = $1
            ORDER BY display_order ASC
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(domains)
    }

    async fn facets(&self, domain_id: Uuid) -> Result<Vec<Facet>, StoreError> {
        let facets = sqlx::query_as::<_, Facet>(
            r#"
            SELECT
                id, domain_id, name_en, name_de, description_en, description_de,
                display_order, created_at, updated_at
            FROM facets
            WHERE domain_id = $1
            ORDER BY display_order ASC
            "#,
        )
        .bind(domain_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(facets)
    }

    async fn count_questions(&self, test_id: Uuid) -> Result<i64, StoreError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM questions WHERE test_id = $1")
                .bind(test_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn questions(
        &self,
        test_id: Uuid,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Question>, StoreError> {
        // LIMIT NULL means "no limit" in Postgres.
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT
                id, test_id, domain_id, facet_id, text_en, text_de,
                is_reverse_keyed, display_order, created_at, updated_at
            FROM questions
            WHERE test_id = $1
            ORDER BY display_order ASC, id ASC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(test_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(questions)
    }
}

#[async_trait]
impl ResponseRepository for PgStore {
    async fn insert_responses(&self, rows: &[NewResponse]) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut query_builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO responses (session_id, test_id, question_id, response_value) ",
        );
        query_builder.push_values(rows, |mut b, row| {
            b.push_bind(row.session_id)
                .push_bind(row.test_id)
                .push_bind(row.question_id)
                .push_bind(row.value.get());
        });

        // A resubmitted answer replaces the earlier one.
        query_builder.push(
            " ON CONFLICT (session_id, question_id) DO UPDATE SET \
             response_value = EXCLUDED.response_value, created_at = NOW()",
        );

        let result = query_builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn responses(
        &self,
        session_id: Uuid,
        test_id: Uuid,
    ) -> Result<Vec<Response>, StoreError> {
        let responses = sqlx::query_as::<_, Response>(
            r#"
            SELECT id, session_id, test_id, question_id, response_value, created_at
            FROM responses
            WHERE session_id = $1 AND test_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(session_id)
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(responses)
    }
}

#[async_trait]
impl ResultRepository for PgStore {
    async fn upsert_result(&self, result: &NewResult) -> Result<(), StoreError> {
        // The domain must belong to the test; the subselect yields no row otherwise.
        let written = sqlx::query(
            r#"
            INSERT INTO results (session_id, test_id, domain_id, score)
            SELECT $1, d.test_id, d.id, $4
            FROM domains d
            WHERE d.id = $3 AND d.test_id = $2
            ON CONFLICT (session_id, test_id, domain_id) DO UPDATE SET
                score = EXCLUDED.score,
                created_at = NOW()
            "#,
        )
        .bind(result.session_id)
        .bind(result.test_id)
        .bind(result.domain_id)
        .bind(result.score)
        .execute(&self.pool)
        .await?;

        if written.rows_affected() == 0 {
            return Err(StoreError::Constraint(format!(
                "domain {} does not belong to test {}",
                result.domain_id, result.test_id
            )));
        }
        Ok(())
    }

    async fn results(
        &self,
        session_id: Uuid,
        test_id: Uuid,
    ) -> Result<Vec<ResultRecord>, StoreError> {
        let results = sqlx::query_as::<_, ResultRecord>(
            r#"
            SELECT id, session_id, test_id, domain_id, score, created_at
            FROM results
            WHERE session_id = $1 AND test_id = $2
            "#,
        )
        .bind(session_id)
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }
}

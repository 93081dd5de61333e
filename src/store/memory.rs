// src/store/memory.rs

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
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

#[derive(Default)]
struct Tables {
    tests: Vec<Test>,
    domains: Vec<Domain>,
    facets: Vec<Facet>,
    questions: Vec<Question>,
    sessions: HashMap<Uuid, UserSession>,
    responses: Vec<Response>,
    results: Vec<ResultRecord>,
}

/// In-process store with the same constraints as the Postgres schema.
///
/// `set_reads_failing` / `set_writes_failing` make every read or write return
/// `StoreError::Unavailable`, which is how tests exercise the fallback paths.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reads_failing(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    pub fn set_writes_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        Ok(self.lock())
    }

    fn write(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(self.lock())
    }

    /// Adds an active test. Successive calls get strictly increasing `created_at`.
    pub fn seed_test(&self, name: &str) -> Test {
        let mut tables = self.lock();
        let mut created_at = Utc::now();
        if let Some(latest) = tables.tests.iter().map(|t| t.created_at).max() {
            if created_at <= latest {
                created_at = latest + chrono::Duration::milliseconds(1);
            }
        }

        let test = Test {
            id: Uuid::new_v4(),
            name_en: name.to_string(),
            name_de: format!("{} (de)", name),
            description_en: format!("About {}", name),
            description_de: format!("Über {}", name),
            active: true,
            created_at,
            updated_at: created_at,
        };
        tables.tests.push(test.clone());
        test
    }

    pub fn deactivate_test(&self, test_id: Uuid) {
        for test in self.lock().tests.iter_mut().filter(|t| t.id == test_id) {
            test.active = false;
        }
    }

    pub fn seed_domain(&self, test_id: Uuid, name: &str, display_order: i32) -> Domain {
        let now = Utc::now();
        let domain = Domain {
            id: Uuid::new_v4(),
            test_id,
            name_en: name.to_string(),
            name_de: format!("{} (de)", name),
            description_en: String::new(),
            description_de: String::new(),
            display_order,
            created_at: now,
            updated_at: now,
        };
        self.lock().domains.push(domain.clone());
        domain
    }

    pub fn seed_facet(&self, domain_id: Uuid, name: &str, display_order: i32) -> Facet {
        let now = Utc::now();
        let facet = Facet {
            id: Uuid::new_v4(),
            domain_id,
            name_en: name.to_string(),
            name_de: format!("{} (de)", name),
            description_en: String::new(),
            description_de: String::new(),
            display_order,
            created_at: now,
            updated_at: now,
        };
        self.lock().facets.push(facet.clone());
        facet
    }

    pub fn seed_question(
        &self,
        domain: &Domain,
        facet_id: Option<Uuid>,
        is_reverse_keyed: bool,
        display_order: i32,
    ) -> Question {
        let now = Utc::now();
        let question = Question {
            id: Uuid::new_v4(),
            test_id: domain.test_id,
            domain_id: domain.id,
            facet_id,
            text_en: format!("Question {}", display_order),
            text_de: format!("Frage {}", display_order),
            is_reverse_keyed,
            display_order,
            created_at: now,
            updated_at: now,
        };
        self.lock().questions.push(question.clone());
        question
    }

    /// Number of stored response rows, across all sessions.
    pub fn response_count(&self) -> usize {
        self.lock().responses.len()
    }

    /// Number of stored result rows, across all sessions.
    pub fn result_count(&self) -> usize {
        self.lock().results.len()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }
}

fn apply_demographics(session: &mut UserSession, data: &Demographics) {
    session.age_group = Some(data.age_group.clone());
    session.gender = Some(data.gender.clone());
    session.salary = data.salary.clone();
    session.leadership = Some(data.leadership.clone());
    session.previously_taken = data.previously_taken;
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn find_session_id(&self, token: &str) -> Result<Option<Uuid>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.session_token == token)
            .map(|s| s.id))
    }

    async fn find_session(&self, token: &str) -> Result<Option<UserSession>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.session_token == token)
            .cloned())
    }

    async fn insert_session(&self, session: &NewSession) -> Result<Uuid, StoreError> {
        let mut tables = self.write()?;
        if tables
            .sessions
            .values()
            .any(|s| s.session_token == session.session_token)
        {
            return Err(StoreError::Conflict);
        }

        let id = Uuid::new_v4();
        tables.sessions.insert(
            id,
            UserSession {
                id,
                session_token: session.session_token.clone(),
                language: session.language.as_str().to_string(),
                age_group: None,
                gender: None,
                salary: None,
                leadership: None,
                previously_taken: false,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn update_demographics(&self, id: Uuid, data: &Demographics) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let session = tables.sessions.get_mut(&id).ok_or(StoreError::NotFound)?;
        apply_demographics(session, data);
        Ok(())
    }

    async fn update_demographics_by_token(
        &self,
        token: &str,
        data: &Demographics,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let session = tables
            .sessions
            .values_mut()
            .find(|s| s.session_token == token)
            .ok_or(StoreError::NotFound)?;
        apply_demographics(session, data);
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn active_tests(&self) -> Result<Vec<Test>, StoreError> {
        let tables = self.read()?;
        let mut tests: Vec<Test> = tables.tests.iter().filter(|t| t.active).cloned().collect();
        tests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tests)
    }

    async fn test(&self, id: Uuid) -> Result<Option<Test>, StoreError> {
        let tables = self.read()?;
        Ok(tables.tests.iter().find(|t| t.id == id).cloned())
    }

    async fn domains(&self, test_id: Uuid) -> Result<Vec<Domain>, StoreError> {
        let tables = self.read()?;
        let mut domains: Vec<Domain> = tables
            .domains
            .iter()
            .filter(|d| d.test_id == test_id)
            .cloned()
            .collect();
        domains.sort_by_key(|d| d.display_order);
        Ok(domains)
    }

    async fn facets(&self, domain_id: Uuid) -> Result<Vec<Facet>, StoreError> {
        let tables = self.read()?;
        let mut facets: Vec<Facet> = tables
            .facets
            .iter()
            .filter(|f| f.domain_id == domain_id)
            .cloned()
            .collect();
        facets.sort_by_key(|f| f.display_order);
        Ok(facets)
    }

    async fn count_questions(&self, test_id: Uuid) -> Result<i64, StoreError> {
        let tables = self.read()?;
        let count = tables
            .questions
            .iter()
            .filter(|q| q.test_id == test_id)
            .count();
        Ok(count as i64)
    }

    async fn questions(
        &self,
        test_id: Uuid,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Question>, StoreError> {
        let tables = self.read()?;
        let mut questions: Vec<Question> = tables
            .questions
            .iter()
            .filter(|q| q.test_id == test_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| (q.display_order, q.id));

        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let limit = limit
            .map(|l| usize::try_from(l.max(0)).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(questions.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl ResponseRepository for InMemoryStore {
    async fn insert_responses(&self, rows: &[NewResponse]) -> Result<u64, StoreError> {
        let mut tables = self.write()?;

        // Validate the whole batch first so a bad row writes nothing.
        for row in rows {
            if !tables.sessions.contains_key(&row.session_id) {
                return Err(StoreError::Constraint(format!(
                    "session {} does not exist",
                    row.session_id
                )));
            }
            let belongs = tables
                .questions
                .iter()
                .any(|q| q.id == row.question_id && q.test_id == row.test_id);
            if !belongs {
                return Err(StoreError::Constraint(format!(
                    "question {} does not belong to test {}",
                    row.question_id, row.test_id
                )));
            }
        }

        let now = Utc::now();
        for row in rows {
            let existing = tables.responses.iter_mut().find(|r| {
                r.session_id == row.session_id && r.question_id == row.question_id
            });
            match existing {
                Some(answer) => {
                    answer.response_value = row.value.get();
                    answer.created_at = now;
                }
                None => tables.responses.push(Response {
                    id: Uuid::new_v4(),
                    session_id: row.session_id,
                    test_id: row.test_id,
                    question_id: row.question_id,
                    response_value: row.value.get(),
                    created_at: now,
                }),
            }
        }
        Ok(rows.len() as u64)
    }

    async fn responses(
        &self,
        session_id: Uuid,
        test_id: Uuid,
    ) -> Result<Vec<Response>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .responses
            .iter()
            .filter(|r| r.session_id == session_id && r.test_id == test_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ResultRepository for InMemoryStore {
    async fn upsert_result(&self, result: &NewResult) -> Result<(), StoreError> {
        let mut tables = self.write()?;

        if !tables.sessions.contains_key(&result.session_id) {
            return Err(StoreError::Constraint(format!(
                "session {} does not exist",
                result.session_id
            )));
        }
        let belongs = tables
            .domains
            .iter()
            .any(|d| d.id == result.domain_id && d.test_id == result.test_id);
        if !belongs {
            return Err(StoreError::Constraint(format!(
                "domain {} does not belong to test {}",
                result.domain_id, result.test_id
            )));
        }

        let now = Utc::now();
        let existing = tables.results.iter_mut().find(|r| {
            r.session_id == result.session_id
                && r.test_id == result.test_id
                && r.domain_id == result.domain_id
        });
        match existing {
            Some(row) => {
                row.score = result.score;
                row.created_at = now;
            }
            None => tables.results.push(ResultRecord {
                id: Uuid::new_v4(),
                session_id: result.session_id,
                test_id: result.test_id,
                domain_id: result.domain_id,
                score: result.score,
                created_at: now,
            }),
        }
        Ok(())
    }

    async fn results(
        &self,
        session_id: Uuid,
        test_id: Uuid,
    ) -> Result<Vec<ResultRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .results
            .iter()
            .filter(|r| r.session_id == session_id && r.test_id == test_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{language::Language, response::LikertValue};

    fn new_session(token: &str) -> NewSession {
        NewSession {
            session_token: token.to_string(),
            language: Language::En,
        }
    }

    #[tokio::test]
    async fn duplicate_token_conflicts() {
        let store = InMemoryStore::new();
        store.insert_session(&new_session("token-0001")).await.unwrap();
        let err = store
            .insert_session(&new_session("token-0001"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn response_batch_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let test = store.seed_test("Big Five");
        let other = store.seed_test("Other");
        let domain = store.seed_domain(test.id, "Openness", 1);
        let other_domain = store.seed_domain(other.id, "Other", 1);
        let q = store.seed_question(&domain, None, false, 1);
        let foreign = store.seed_question(&other_domain, None, false, 1);
        let session_id = store.insert_session(&new_session("token-0002")).await.unwrap();

        let value = LikertValue::new(4).unwrap();
        let rows = [
            NewResponse { session_id, test_id: test.id, question_id: q.id, value },
            NewResponse { session_id, test_id: test.id, question_id: foreign.id, value },
        ];
        let err = store.insert_responses(&rows).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert_eq!(store.response_count(), 0);
    }

    #[tokio::test]
    async fn resubmitted_answer_replaces_earlier_one() {
        let store = InMemoryStore::new();
        let test = store.seed_test("Big Five");
        let domain = store.seed_domain(test.id, "Openness", 1);
        let q = store.seed_question(&domain, None, false, 1);
        let session_id = store.insert_session(&new_session("token-0004")).await.unwrap();

        for value in [2, 6] {
            let row = NewResponse {
                session_id,
                test_id: test.id,
                question_id: q.id,
                value: LikertValue::new(value).unwrap(),
            };
            store.insert_responses(&[row]).await.unwrap();
        }

        let rows = store.responses(session_id, test.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].response_value, 6);
    }

    #[tokio::test]
    async fn result_upsert_replaces_score() {
        let store = InMemoryStore::new();
        let test = store.seed_test("Big Five");
        let domain = store.seed_domain(test.id, "Openness", 1);
        let session_id = store.insert_session(&new_session("token-0003")).await.unwrap();

        let mut result = NewResult {
            session_id,
            test_id: test.id,
            domain_id: domain.id,
            score: 40.0,
        };
        store.upsert_result(&result).await.unwrap();
        result.score = 75.0;
        store.upsert_result(&result).await.unwrap();

        let rows = store.results(session_id, test.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 75.0);
    }

    #[tokio::test]
    async fn active_tests_newest_first() {
        let store = InMemoryStore::new();
        let first = store.seed_test("First");
        let second = store.seed_test("Second");
        let hidden = store.seed_test("Hidden");
        store.deactivate_test(hidden.id);

        let tests = store.active_tests().await.unwrap();
        let ids: Vec<Uuid> = tests.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn failing_reads_surface_unavailable() {
        let store = InMemoryStore::new();
        store.set_reads_failing(true);
        let err = store.active_tests().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}

// tests/pg_store_tests.rs
//
// Runs against a real Postgres. Start one, set DATABASE_URL and run
// `cargo test -- --ignored`.

use personality_backend::{
    models::{
        language::Language,
        response::{LikertValue, NewResponse},
        score::NewResult,
        session::{Demographics, NewSession},
    },
    store::{
        CatalogRepository, PgStore, ResponseRepository, ResultRepository, SessionRepository,
        StoreError,
    },
};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

struct Seeded {
    store: PgStore,
    test_id: Uuid,
    domain_id: Uuid,
    question_ids: Vec<Uuid>,
}

async fn connect() -> PgStore {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");
    PgStore::new(pool)
}

/// Inserts a fresh test with one domain and `count` questions.
async fn seed(count: i32) -> Seeded {
    let store = connect().await;
    let pool = store.pool();

    let test_id: Uuid = sqlx::query_scalar(
        "INSERT INTO tests (name_en, name_de) VALUES ('Pg Test', 'Pg Test (de)') RETURNING id",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    let domain_id: Uuid = sqlx::query_scalar(
        "INSERT INTO domains (test_id, name_en, name_de, display_order) VALUES ($1, 'Openness', 'Offenheit', 1) RETURNING id",
    )
    .bind(test_id)
    .fetch_one(pool)
    .await
    .unwrap();

    let mut question_ids = Vec::new();
    for order in 1..=count {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO questions (test_id, domain_id, text_en, text_de, is_reverse_keyed, display_order) VALUES ($1, $2, 'q', 'f', $3, $4) RETURNING id",
        )
        .bind(test_id)
        .bind(domain_id)
        .bind(order % 2 == 0)
        .bind(order)
        .fetch_one(pool)
        .await
        .unwrap();
        question_ids.push(id);
    }

    Seeded {
        store,
        test_id,
        domain_id,
        question_ids,
    }
}

fn token() -> String {
    format!("pg-{}", Uuid::new_v4())
}

#[tokio::test]
#[ignore]
async fn duplicate_token_is_a_conflict() {
    let store = connect().await;
    let new = NewSession {
        session_token: token(),
        language: Language::De,
    };

    let id = store.insert_session(&new).await.unwrap();
    let err = store.insert_session(&new).await.unwrap_err();

    assert!(matches!(err, StoreError::Conflict));
    assert_eq!(store.find_session_id(&new.session_token).await.unwrap(), Some(id));
}

#[tokio::test]
#[ignore]
async fn demographics_update_by_token() {
    let store = connect().await;
    let new = NewSession {
        session_token: token(),
        language: Language::En,
    };
    store.insert_session(&new).await.unwrap();

    let data = Demographics {
        age_group: "45-54".to_string(),
        gender: "other".to_string(),
        salary: Some("over100k".to_string()),
        leadership: "yes".to_string(),
        previously_taken: true,
    };
    store
        .update_demographics_by_token(&new.session_token, &data)
        .await
        .unwrap();

    let session = store.find_session(&new.session_token).await.unwrap().unwrap();
    assert_eq!(session.leadership.as_deref(), Some("yes"));
    assert_eq!(session.salary.as_deref(), Some("over100k"));
}

#[tokio::test]
#[ignore]
async fn questions_page_with_offset_and_limit() {
    let seeded = seed(12).await;
    let store = &seeded.store;

    assert_eq!(store.count_questions(seeded.test_id).await.unwrap(), 12);
    let page = store.questions(seeded.test_id, 10, Some(10)).await.unwrap();
    let ids: Vec<Uuid> = page.iter().map(|q| q.id).collect();
    assert_eq!(ids, seeded.question_ids[10..].to_vec());

    let all = store.questions(seeded.test_id, 0, None).await.unwrap();
    assert_eq!(all.len(), 12);
}

#[tokio::test]
#[ignore]
async fn response_for_foreign_question_is_rejected() {
    let seeded = seed(2).await;
    let other = seed(1).await;
    let store = &seeded.store;
    let session_id = store
        .insert_session(&NewSession {
            session_token: token(),
            language: Language::En,
        })
        .await
        .unwrap();

    let value = LikertValue::new(5).unwrap();
    let rows = [
        NewResponse {
            session_id,
            test_id: seeded.test_id,
            question_id: seeded.question_ids[0],
            value,
        },
        NewResponse {
            session_id,
            test_id: seeded.test_id,
            question_id: other.question_ids[0],
            value,
        },
    ];

    let err = store.insert_responses(&rows).await.unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
    assert!(
        store
            .responses(session_id, seeded.test_id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
#[ignore]
async fn rescoring_updates_the_single_result_row() {
    let seeded = seed(1).await;
    let store = &seeded.store;
    let session_id = store
        .insert_session(&NewSession {
            session_token: token(),
            language: Language::En,
        })
        .await
        .unwrap();

    for score in [37.5, 62.5] {
        store
            .upsert_result(&NewResult {
                session_id,
                test_id: seeded.test_id,
                domain_id: seeded.domain_id,
                score,
            })
            .await
            .unwrap();
    }

    let results = store.results(session_id, seeded.test_id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].score, 62.5);
}

// src/quiz/replay.rs

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use uuid::Uuid;

use super::session::SessionResolver;
use crate::{
    fallback::{FallbackKey, FallbackStore, StagedEntry},
    models::{
        response::{LikertValue, NewResponse},
        score::NewResult,
        session::Demographics,
    },
    store::{ResponseRepository, ResultRepository},
};

/// Counts of staged entries moved into the store (`*_replayed`) and still
/// waiting in the fallback store (`pending`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayOutcome {
    pub responses_replayed: usize,
    pub results_replayed: usize,
    pub demographics_replayed: bool,
    pub pending: usize,
}

/// Moves entries staged during an outage into the store.
#[derive(Clone)]
pub struct Replayer {
    resolver: SessionResolver,
    responses: Arc<dyn ResponseRepository>,
    results: Arc<dyn ResultRepository>,
    fallback: Arc<dyn FallbackStore>,
}

impl Replayer {
    pub fn new(
        resolver: SessionResolver,
        responses: Arc<dyn ResponseRepository>,
        results: Arc<dyn ResultRepository>,
        fallback: Arc<dyn FallbackStore>,
    ) -> Self {
        Self {
            resolver,
            responses,
            results,
            fallback,
        }
    }

    /// Re-attempts every staged write for `token` once. Entries that fail
    /// again are staged back.
    pub async fn replay(&self, token: &str) -> ReplayOutcome {
        let keys = [
            FallbackKey::responses(token),
            FallbackKey::results(token),
            FallbackKey::demographics(token),
        ];

        let session = self.resolver.resolve(token, None).await;
        if !session.is_persisted() {
            tracing::warn!("Store still unavailable, nothing replayed");
            return ReplayOutcome {
                pending: keys.iter().map(|k| self.fallback.peek(k).len()).sum(),
                ..ReplayOutcome::default()
            };
        }

        let mut outcome = ReplayOutcome::default();

        let staged = self.fallback.drain(&keys[0]);
        if !staged.is_empty() {
            outcome.responses_replayed = self.replay_responses(token, session.id, staged).await;
        }

        for entry in self.fallback.drain(&keys[1]) {
            if let StagedEntry::Result {
                test_id,
                domain_id,
                score,
            } = entry
            {
                let result = NewResult {
                    session_id: session.id,
                    test_id,
                    domain_id,
                    score,
                };
                match self.results.upsert_result(&result).await {
                    Ok(()) => outcome.results_replayed += 1,
                    Err(e) => {
                        tracing::error!(%domain_id, "Replaying result failed: {}", e);
                        self.fallback.stage(&keys[1], entry);
                    }
                }
            }
        }

        // Only the newest demographics are ever staged.
        let demographics: Option<Demographics> =
            self.fallback
                .drain(&keys[2])
                .into_iter()
                .rev()
                .find_map(|entry| match entry {
                    StagedEntry::Demographics(d) => Some(d),
                    _ => None,
                });
        if let Some(demographics) = demographics {
            // Failure re-stages inside the resolver.
            outcome.demographics_replayed = matches!(
                self.resolver
                    .update_demographics(token, true, demographics)
                    .await,
                Ok(true)
            );
        }

        outcome.pending = keys.iter().map(|k| self.fallback.peek(k).len()).sum();
        tracing::info!(
            responses = outcome.responses_replayed,
            results = outcome.results_replayed,
            demographics = outcome.demographics_replayed,
            pending = outcome.pending,
            "Replayed staged writes"
        );
        outcome
    }

    /// One batch per test so a broken test does not hold back the others.
    async fn replay_responses(
        &self,
        token: &str,
        session_id: Uuid,
        staged: Vec<StagedEntry>,
    ) -> usize {
        let mut by_test: BTreeMap<Uuid, Vec<(Uuid, LikertValue)>> = BTreeMap::new();
        for entry in staged {
            if let StagedEntry::Response {
                test_id,
                question_id,
                value,
            } = entry
            {
                by_test.entry(test_id).or_default().push((question_id, value));
            }
        }

        let key = FallbackKey::responses(token);
        let mut replayed = 0;
        for (test_id, answers) in by_test {
            let mut rows: Vec<NewResponse> = answers
                .iter()
                .map(|(question_id, value)| NewResponse {
                    session_id,
                    test_id,
                    question_id: *question_id,
                    value: *value,
                })
                .collect();
            rows.sort_by_key(|r| r.question_id);

            match self.responses.insert_responses(&rows).await {
                Ok(_) => replayed += rows.len(),
                Err(e) => {
                    tracing::error!(%test_id, "Replaying responses failed: {}", e);
                    for (question_id, value) in answers {
                        self.fallback.stage(
                            &key,
                            StagedEntry::Response {
                                test_id,
                                question_id,
                                value,
                            },
                        );
                    }
                }
            }
        }
        replayed
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        fallback::MemoryFallback,
        models::{catalog::Question, language::Language},
        quiz::{catalog::CatalogReader, recorder::ResponseRecorder, scorer::Scorer},
        store::InMemoryStore,
    };

    const TOKEN: &str = "replay-session-token";

    struct Fixture {
        store: InMemoryStore,
        fallback: Arc<MemoryFallback>,
        resolver: SessionResolver,
        recorder: ResponseRecorder,
        scorer: Scorer,
        replayer: Replayer,
        test_id: Uuid,
        questions: Vec<Question>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let test = store.seed_test("Big Five");
        let domain = store.seed_domain(test.id, "Neuroticism", 1);
        let questions = (1..=3)
            .map(|order| store.seed_question(&domain, None, false, order))
            .collect();

        let fallback = Arc::new(MemoryFallback::new());
        let resolver = SessionResolver::new(Arc::new(store.clone()), fallback.clone());
        let catalog = CatalogReader::new(Arc::new(store.clone()), 10);
        let recorder = ResponseRecorder::new(
            resolver.clone(),
            catalog.clone(),
            Arc::new(store.clone()),
            fallback.clone(),
        );
        let scorer = Scorer::new(
            resolver.clone(),
            catalog,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            fallback.clone(),
        );
        let replayer = Replayer::new(
            resolver.clone(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            fallback.clone(),
        );

        Fixture {
            store,
            fallback,
            resolver,
            recorder,
            scorer,
            replayer,
            test_id: test.id,
            questions,
        }
    }

    fn answers(questions: &[Question]) -> HashMap<Uuid, LikertValue> {
        questions
            .iter()
            .filter_map(|q| LikertValue::new(7).map(|v| (q.id, v)))
            .collect()
    }

    #[tokio::test]
    async fn nothing_staged_is_a_no_op() {
        let f = fixture();
        let outcome = f.replayer.replay(TOKEN).await;
        assert_eq!(outcome, ReplayOutcome::default());
    }

    #[tokio::test]
    async fn staged_writes_land_once_the_store_recovers() {
        let f = fixture();
        f.resolver.resolve(TOKEN, None).await;
        f.store.set_writes_failing(true);
        f.recorder
            .record(TOKEN, f.test_id, Some(0), &answers(&f.questions))
            .await
            .unwrap();
        f.scorer.score(TOKEN, f.test_id, Language::En).await.unwrap();
        assert_eq!(f.store.response_count(), 0);
        assert_eq!(f.store.result_count(), 0);

        f.store.set_writes_failing(false);
        let outcome = f.replayer.replay(TOKEN).await;

        assert_eq!(outcome.responses_replayed, 3);
        assert_eq!(outcome.results_replayed, 1);
        assert_eq!(outcome.pending, 0);
        assert_eq!(f.store.response_count(), 3);
        assert_eq!(f.store.result_count(), 1);
        assert!(f.fallback.peek(&FallbackKey::responses(TOKEN)).is_empty());
    }

    #[tokio::test]
    async fn failing_replay_keeps_entries_staged() {
        let f = fixture();
        f.resolver.resolve(TOKEN, None).await;
        f.store.set_writes_failing(true);
        f.recorder
            .record(TOKEN, f.test_id, None, &answers(&f.questions[..2]))
            .await
            .unwrap();

        let outcome = f.replayer.replay(TOKEN).await;
        assert_eq!(outcome.responses_replayed, 0);
        assert_eq!(outcome.pending, 2);
        assert_eq!(f.fallback.peek(&FallbackKey::responses(TOKEN)).len(), 2);
    }

    #[tokio::test]
    async fn replay_keeps_the_newer_stored_score() {
        let f = fixture();
        f.resolver.resolve(TOKEN, None).await;
        f.store.set_writes_failing(true);
        f.scorer.score(TOKEN, f.test_id, Language::En).await.unwrap();

        f.store.set_writes_failing(false);
        f.recorder
            .record(TOKEN, f.test_id, Some(0), &answers(&f.questions))
            .await
            .unwrap();
        let fresh = f.scorer.score(TOKEN, f.test_id, Language::En).await.unwrap();
        assert_eq!(fresh.domain_results[0].score, 87.5);

        let outcome = f.replayer.replay(TOKEN).await;
        assert_eq!(outcome.results_replayed, 0);
        assert_eq!(outcome.pending, 0);

        let stored = f
            .scorer
            .stored_results(TOKEN, f.test_id, Language::En)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].score, 87.5);
    }

    #[tokio::test]
    async fn replayed_answer_replaces_stored_one() {
        let f = fixture();
        f.recorder
            .record(TOKEN, f.test_id, None, &answers(&f.questions[..1]))
            .await
            .unwrap();
        f.store.set_writes_failing(true);
        let mut changed = HashMap::new();
        changed.insert(f.questions[0].id, LikertValue::new(3).unwrap());
        f.recorder
            .record(TOKEN, f.test_id, None, &changed)
            .await
            .unwrap();

        f.store.set_writes_failing(false);
        let outcome = f.replayer.replay(TOKEN).await;
        assert_eq!(outcome.responses_replayed, 1);
        assert_eq!(f.store.response_count(), 1);

        let report = f.scorer.score(TOKEN, f.test_id, Language::En).await.unwrap();
        assert_eq!(report.domain_results[0].answered, 1);
        assert_eq!(report.domain_results[0].score, 37.5);
    }

    #[tokio::test]
    async fn unreachable_store_drains_nothing() {
        let f = fixture();
        f.store.set_reads_failing(true);
        f.store.set_writes_failing(true);
        f.recorder
            .record(TOKEN, f.test_id, None, &answers(&f.questions))
            .await
            .unwrap();

        let outcome = f.replayer.replay(TOKEN).await;
        assert_eq!(outcome.pending, 3);
        assert_eq!(f.fallback.peek(&FallbackKey::responses(TOKEN)).len(), 3);
    }

    #[tokio::test]
    async fn staged_demographics_are_written() {
        let f = fixture();
        f.resolver.resolve(TOKEN, None).await;
        f.store.set_writes_failing(true);
        let demographics = Demographics {
            age_group: "25-34".to_string(),
            gender: "female".to_string(),
            salary: Some("50k-75k".to_string()),
            leadership: "no".to_string(),
            previously_taken: false,
        };
        let persisted = f
            .resolver
            .update_demographics(TOKEN, true, demographics)
            .await
            .unwrap();
        assert!(!persisted);

        f.store.set_writes_failing(false);
        let outcome = f.replayer.replay(TOKEN).await;
        assert!(outcome.demographics_replayed);
        assert_eq!(outcome.pending, 0);
    }
}

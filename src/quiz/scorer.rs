// src/quiz/scorer.rs

use std::{collections::HashMap, sync::Arc};

use uuid::Uuid;

use super::{catalog::CatalogReader, session::SessionResolver};
use crate::{
    error::AppError,
    fallback::{FallbackKey, FallbackStore, StagedEntry},
    models::{
        catalog::{DimensionView, Domain, Question, TestView},
        language::Language,
        response::{LIKERT_MAX, LikertValue},
        score::{DomainScore, FacetScore, NewResult, ScoreReport, StoredResult},
    },
    store::{ResponseRepository, ResultRepository},
};

/// Score reported for a domain (or facet) without any answers.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Running sum of contributions for one domain or facet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub total: i64,
    pub count: usize,
}

impl Tally {
    pub fn add(&mut self, value: LikertValue, reverse_keyed: bool) {
        self.total += i64::from(value.contribution(reverse_keyed));
        self.count += 1;
    }

    /// Percentage of the maximum possible total, or the neutral score when empty.
    pub fn score(&self) -> f64 {
        if self.count == 0 {
            return NEUTRAL_SCORE;
        }
        let max_possible = self.count as f64 * f64::from(LIKERT_MAX);
        self.total as f64 / max_possible * 100.0
    }
}

/// One answer joined with the question it belongs to.
#[derive(Debug, Clone, Copy)]
struct ScoredAnswer {
    domain_id: Uuid,
    facet_id: Option<Uuid>,
    reverse_keyed: bool,
    value: LikertValue,
}

/// Computes and stores per-domain scores for a finished attempt.
#[derive(Clone)]
pub struct Scorer {
    resolver: SessionResolver,
    catalog: CatalogReader,
    responses: Arc<dyn ResponseRepository>,
    results: Arc<dyn ResultRepository>,
    fallback: Arc<dyn FallbackStore>,
}

impl Scorer {
    pub fn new(
        resolver: SessionResolver,
        catalog: CatalogReader,
        responses: Arc<dyn ResponseRepository>,
        results: Arc<dyn ResultRepository>,
        fallback: Arc<dyn FallbackStore>,
    ) -> Self {
        Self {
            resolver,
            catalog,
            responses,
            results,
            fallback,
        }
    }

    /// Scores every domain of `test_id` for the session behind `token`.
    ///
    /// * Domains come back in display order, each with its facet sub-scores.
    /// * Answers staged in the fallback store count alongside stored ones.
    /// * A result that cannot be written is staged; its score is still returned.
    pub async fn score(
        &self,
        token: &str,
        test_id: Uuid,
        lang: Language,
    ) -> Result<ScoreReport, AppError> {
        let test = self.catalog.get_test(test_id).await?;
        let domains = self.catalog.list_domains(test_id).await;
        let session = self.resolver.resolve(token, Some(lang)).await;

        let answers = self
            .collect_answers(token, test_id, session.is_persisted().then_some(session.id))
            .await;

        let mut domain_results = Vec::with_capacity(domains.len());
        let mut persisted = session.is_persisted();

        for domain in &domains {
            let tally = tally_where(&answers, |a| a.domain_id == domain.id);
            let score = tally.score();
            let facet_scores = self.facet_scores(domain, &answers, lang).await;

            let written = session.is_persisted()
                && self
                    .save(NewResult {
                        session_id: session.id,
                        test_id,
                        domain_id: domain.id,
                        score,
                    })
                    .await;
            let entry = StagedEntry::Result {
                test_id,
                domain_id: domain.id,
                score,
            };
            if written {
                // A score staged by an earlier attempt is now stale.
                self.fallback.unstage(&FallbackKey::results(token), &entry);
            } else {
                persisted = false;
                self.fallback.stage(&FallbackKey::results(token), entry);
            }

            domain_results.push(DomainScore {
                domain: DimensionView::from_domain(domain, lang),
                score,
                answered: tally.count,
                facet_scores,
            });
        }

        tracing::info!(
            %test_id,
            domains = domain_results.len(),
            answers = answers.len(),
            persisted,
            "Scored test attempt"
        );

        Ok(ScoreReport {
            test: TestView::localize(&test, lang),
            domain_results,
            session_token: token.to_string(),
            persisted,
        })
    }

    /// Scores previously written for this session, in domain display order.
    /// Scores still waiting in the fallback store are included.
    pub async fn stored_results(
        &self,
        token: &str,
        test_id: Uuid,
        lang: Language,
    ) -> Result<Vec<StoredResult>, AppError> {
        // Validates the test id before anything else.
        self.catalog.get_test(test_id).await?;
        let domains = self.catalog.list_domains(test_id).await;
        let session = self.resolver.resolve(token, Some(lang)).await;

        let mut scores: HashMap<Uuid, (f64, chrono::DateTime<chrono::Utc>)> = HashMap::new();
        if session.is_persisted() {
            match self.results.results(session.id, test_id).await {
                Ok(rows) => {
                    for row in rows {
                        scores.insert(row.domain_id, (row.score, row.created_at));
                    }
                }
                Err(e) => tracing::warn!(%test_id, "Failed to fetch stored results: {}", e),
            }
        }
        let now = chrono::Utc::now();
        for entry in self.fallback.peek(&FallbackKey::results(token)) {
            if let StagedEntry::Result {
                test_id: staged_test,
                domain_id,
                score,
            } = entry
            {
                if staged_test == test_id {
                    scores.insert(domain_id, (score, now));
                }
            }
        }

        Ok(domains
            .iter()
            .filter_map(|domain| {
                scores.get(&domain.id).map(|(score, created_at)| StoredResult {
                    domain: DimensionView::from_domain(domain, lang),
                    score: *score,
                    created_at: *created_at,
                })
            })
            .collect())
    }

    async fn save(&self, result: NewResult) -> bool {
        match self.results.upsert_result(&result).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(domain_id = %result.domain_id, "Error saving result: {}", e);
                false
            }
        }
    }

    async fn facet_scores(
        &self,
        domain: &Domain,
        answers: &[ScoredAnswer],
        lang: Language,
    ) -> Vec<FacetScore> {
        self.catalog
            .list_facets(domain.id)
            .await
            .iter()
            .map(|facet| FacetScore {
                facet: DimensionView::from_facet(facet, lang),
                score: tally_where(answers, |a| a.facet_id == Some(facet.id)).score(),
            })
            .collect()
    }

    /// Stored answers for the session plus any staged for the token, joined
    /// with their questions. One answer per question; a staged answer wins
    /// over the stored one. Answers to unknown questions are dropped.
    async fn collect_answers(
        &self,
        token: &str,
        test_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Vec<ScoredAnswer> {
        let questions: HashMap<Uuid, Question> = match self.catalog.all_questions(test_id).await {
            Ok(questions) => questions.into_iter().map(|q| (q.id, q)).collect(),
            Err(e) => {
                tracing::warn!(%test_id, "Failed to fetch questions for scoring: {}", e);
                return Vec::new();
            }
        };

        let mut latest: HashMap<Uuid, LikertValue> = HashMap::new();
        if let Some(session_id) = session_id {
            match self.responses.responses(session_id, test_id).await {
                Ok(rows) => latest.extend(rows.into_iter().filter_map(|r| {
                    let value = LikertValue::new(r.response_value);
                    if value.is_none() {
                        tracing::warn!(response_id = %r.id, "Ignoring out-of-range response");
                    }
                    value.map(|v| (r.question_id, v))
                })),
                Err(e) => tracing::warn!(%test_id, "Failed to fetch responses: {}", e),
            }
        }
        for entry in self.fallback.peek(&FallbackKey::responses(token)) {
            if let StagedEntry::Response {
                test_id: staged_test,
                question_id,
                value,
            } = entry
            {
                if staged_test == test_id {
                    latest.insert(question_id, value);
                }
            }
        }

        latest
            .into_iter()
            .filter_map(|(question_id, value)| {
                questions.get(&question_id).map(|q| ScoredAnswer {
                    domain_id: q.domain_id,
                    facet_id: q.facet_id,
                    reverse_keyed: q.is_reverse_keyed,
                    value,
                })
            })
            .collect()
    }
}

fn tally_where(answers: &[ScoredAnswer], keep: impl Fn(&ScoredAnswer) -> bool) -> Tally {
    answers
        .iter()
        .filter(|a| keep(a))
        .fold(Tally::default(), |mut tally, a| {
            tally.add(a.value, a.reverse_keyed);
            tally
        })
}

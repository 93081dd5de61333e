// src/quiz/session.rs

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use uuid::Uuid;

use crate::{
    error::AppError,
    fallback::{FallbackKey, FallbackStore, StagedEntry},
    models::{
        language::Language,
        session::{Demographics, NewSession},
    },
    store::{SessionRepository, StoreError},
};

/// How a session id was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    Cached,
    Found,
    Created,
    /// Generated locally because the store could not be reached.
    Synthesized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSession {
    pub id: Uuid,
    pub origin: SessionOrigin,
}

impl ResolvedSession {
    /// Whether rows referencing this id can be written to the store.
    pub fn is_persisted(&self) -> bool {
        self.origin != SessionOrigin::Synthesized
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedSession {
    id: Uuid,
    persisted: bool,
}

/// Tokens remembered by the session cache before the oldest are evicted.
pub const SESSION_CACHE_CAPACITY: usize = 10_000;

#[derive(Default)]
struct CacheEntries {
    by_token: HashMap<String, CachedSession>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
}

/// Token -> internal id memo shared by all requests, bounded to `capacity`
/// tokens. Evicting a persisted id only costs a lookup on the next resolve.
pub struct SessionCache {
    entries: Mutex<CacheEntries>,
    capacity: usize,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::with_capacity(SESSION_CACHE_CAPACITY)
    }
}

impl SessionCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(CacheEntries::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, CacheEntries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, token: &str) -> Option<CachedSession> {
        self.lock().by_token.get(token).copied()
    }

    fn put(&self, token: &str, entry: CachedSession) {
        let mut entries = self.lock();
        if entries.by_token.insert(token.to_string(), entry).is_some() {
            return;
        }
        entries.order.push_back(token.to_string());
        while entries.by_token.len() > self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.by_token.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

/// Ordered fallback tiers of a resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Cache,
    Lookup,
    Insert,
    /// Second insert after the lookup or first insert failed.
    RetryInsert,
    /// Re-read after an insert lost a duplicate-key race.
    Reread,
    Synthesize,
}

/// Outcome of `SessionResolver::create`.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session_token: String,
    pub persisted: bool,
}

/// Maps external session tokens to internal ids, creating rows on demand.
///
/// Resolution never fails: when every store tier fails a local id is
/// synthesized so the quiz can continue without persistence.
#[derive(Clone)]
pub struct SessionResolver {
    sessions: Arc<dyn SessionRepository>,
    cache: Arc<SessionCache>,
    fallback: Arc<dyn FallbackStore>,
}

impl SessionResolver {
    pub fn new(sessions: Arc<dyn SessionRepository>, fallback: Arc<dyn FallbackStore>) -> Self {
        Self::with_cache(sessions, fallback, SessionCache::default())
    }

    pub fn with_cache(
        sessions: Arc<dyn SessionRepository>,
        fallback: Arc<dyn FallbackStore>,
        cache: SessionCache,
    ) -> Self {
        Self {
            sessions,
            cache: Arc::new(cache),
            fallback,
        }
    }

    /// Opens a session row for `token` (generated when absent).
    pub async fn create(&self, language: Language, token: Option<String>) -> CreatedSession {
        let session_token = token.unwrap_or_else(|| Uuid::new_v4().to_string());
        let new = NewSession {
            session_token: session_token.clone(),
            language,
        };

        let persisted = match self.sessions.insert_session(&new).await {
            Ok(id) => {
                self.remember(&session_token, id, true);
                true
            }
            Err(StoreError::Conflict) => {
                tracing::info!("Session token already exists, using existing session");
                self.resolve(&session_token, Some(language))
                    .await
                    .is_persisted()
            }
            Err(e) => {
                tracing::error!("Error creating user session: {}", e);
                false
            }
        };

        CreatedSession {
            session_token,
            persisted,
        }
    }

    /// Resolves `token` to an internal id. Resolving the same token again
    /// returns the same id.
    pub async fn resolve(&self, token: &str, language: Option<Language>) -> ResolvedSession {
        let language = language.unwrap_or_default();
        let mut step = Step::Cache;

        loop {
            step = match step {
                Step::Cache => match self.cache.get(token) {
                    Some(hit) if hit.persisted => {
                        return ResolvedSession {
                            id: hit.id,
                            origin: SessionOrigin::Cached,
                        };
                    }
                    // A synthesized id is kept, but the store gets another chance.
                    _ => Step::Lookup,
                },
                Step::Lookup => match self.sessions.find_session_id(token).await {
                    Ok(Some(id)) => return self.found(token, id, SessionOrigin::Found),
                    Ok(None) => Step::Insert,
                    Err(e) => {
                        tracing::warn!("Session lookup failed: {}", e);
                        Step::RetryInsert
                    }
                },
                Step::Insert | Step::RetryInsert => {
                    match self.insert(token, language).await {
                        Ok(id) => {
                            tracing::info!(session_id = %id, "Created new session");
                            return self.found(token, id, SessionOrigin::Created);
                        }
                        Err(StoreError::Conflict) => Step::Reread,
                        Err(e) if step == Step::Insert => {
                            tracing::warn!("Could not create session: {}", e);
                            Step::RetryInsert
                        }
                        Err(e) => {
                            tracing::error!("Failed to create fallback session: {}", e);
                            Step::Synthesize
                        }
                    }
                }
                Step::Reread => match self.sessions.find_session_id(token).await {
                    Ok(Some(id)) => return self.found(token, id, SessionOrigin::Found),
                    Ok(None) => Step::Synthesize,
                    Err(e) => {
                        tracing::error!("Session re-read failed: {}", e);
                        Step::Synthesize
                    }
                },
                Step::Synthesize => return self.synthesize(token),
            };
        }
    }

    async fn insert(&self, token: &str, language: Language) -> Result<Uuid, StoreError> {
        let new = NewSession {
            session_token: token.to_string(),
            language,
        };
        self.sessions.insert_session(&new).await
    }

    fn found(&self, token: &str, id: Uuid, origin: SessionOrigin) -> ResolvedSession {
        self.remember(token, id, true);
        ResolvedSession { id, origin }
    }

    fn synthesize(&self, token: &str) -> ResolvedSession {
        let id = match self.cache.get(token) {
            Some(previous) => previous.id,
            None => {
                let id = Uuid::new_v4();
                tracing::warn!(session_id = %id, "Using local session id as last resort");
                self.remember(token, id, false);
                id
            }
        };
        ResolvedSession {
            id,
            origin: SessionOrigin::Synthesized,
        }
    }

    fn remember(&self, token: &str, id: Uuid, persisted: bool) {
        self.cache.put(token, CachedSession { id, persisted });
    }

    /// Writes demographics onto the session. Tries by internal id, then by
    /// token, then stages them in the fallback store. Returns whether they
    /// were persisted.
    pub async fn update_demographics(
        &self,
        token: &str,
        consent: bool,
        demographics: Demographics,
    ) -> Result<bool, AppError> {
        if !consent {
            return Err(AppError::BadRequest(
                "Consent is required before demographics are collected".to_string(),
            ));
        }

        let session = self.resolve(token, None).await;
        if session.is_persisted() {
            match self
                .sessions
                .update_demographics(session.id, &demographics)
                .await
            {
                Ok(()) => return Ok(true),
                Err(e) => tracing::warn!("Error updating user session by id: {}", e),
            }
        }

        match self
            .sessions
            .update_demographics_by_token(token, &demographics)
            .await
        {
            Ok(()) => {
                tracing::info!("Update succeeded using session token instead of id");
                Ok(true)
            }
            Err(e) => {
                tracing::error!("Alternative update also failed: {}", e);
                self.fallback.stage(
                    &FallbackKey::demographics(token),
                    StagedEntry::Demographics(demographics),
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fallback::MemoryFallback, store::InMemoryStore};

    const TOKEN: &str = "0b6f3c9e-session-token";

    fn resolver(store: &InMemoryStore) -> (SessionResolver, Arc<MemoryFallback>) {
        let fallback = Arc::new(MemoryFallback::new());
        (
            SessionResolver::new(Arc::new(store.clone()), fallback.clone()),
            fallback,
        )
    }

    fn demographics() -> Demographics {
        Demographics {
            age_group: "35-44".to_string(),
            gender: "male".to_string(),
            salary: None,
            leadership: "yes".to_string(),
            previously_taken: true,
        }
    }

    #[tokio::test]
    async fn unseen_token_is_created_then_cached() {
        let store = InMemoryStore::new();
        let (resolver, _) = resolver(&store);

        let first = resolver.resolve(TOKEN, Some(Language::De)).await;
        let second = resolver.resolve(TOKEN, None).await;

        assert_eq!(first.origin, SessionOrigin::Created);
        assert_eq!(second.origin, SessionOrigin::Cached);
        assert_eq!(first.id, second.id);
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn cache_evicts_oldest_tokens_beyond_capacity() {
        let cache = SessionCache::with_capacity(2);
        for token in ["token-aaaa", "token-bbbb", "token-cccc"] {
            cache.put(token, CachedSession { id: Uuid::new_v4(), persisted: true });
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.get("token-aaaa").is_none());
        assert!(cache.get("token-cccc").is_some());
    }

    #[test]
    fn refreshing_a_token_does_not_grow_the_cache() {
        let cache = SessionCache::with_capacity(2);
        let id = Uuid::new_v4();
        cache.put("token-aaaa", CachedSession { id, persisted: false });
        cache.put("token-aaaa", CachedSession { id, persisted: true });
        cache.put("token-bbbb", CachedSession { id, persisted: true });

        assert_eq!(cache.len(), 2);
        assert!(cache.get("token-aaaa").is_some_and(|e| e.persisted));
    }

    #[tokio::test]
    async fn evicted_session_is_found_again_in_the_store() {
        let store = InMemoryStore::new();
        let resolver = SessionResolver::with_cache(
            Arc::new(store.clone()),
            Arc::new(MemoryFallback::new()),
            SessionCache::with_capacity(1),
        );

        let first = resolver.resolve(TOKEN, None).await;
        resolver.resolve("another-session-token", None).await;
        let again = resolver.resolve(TOKEN, None).await;

        assert_eq!(resolver.cache.len(), 1);
        assert_eq!(again.origin, SessionOrigin::Found);
        assert_eq!(again.id, first.id);
        assert_eq!(store.session_count(), 2);
    }

    #[tokio::test]
    async fn separate_resolvers_agree_on_existing_session() {
        let store = InMemoryStore::new();
        let (a, _) = resolver(&store);
        let (b, _) = resolver(&store);

        let created = a.resolve(TOKEN, None).await;
        let found = b.resolve(TOKEN, None).await;
        assert_eq!(found.origin, SessionOrigin::Found);
        assert_eq!(created.id, found.id);
    }

    #[tokio::test]
    async fn outage_synthesizes_a_stable_local_id() {
        let store = InMemoryStore::new();
        store.set_reads_failing(true);
        store.set_writes_failing(true);
        let (resolver, _) = resolver(&store);

        let first = resolver.resolve(TOKEN, None).await;
        let second = resolver.resolve(TOKEN, None).await;
        assert_eq!(first.origin, SessionOrigin::Synthesized);
        assert!(!first.is_persisted());
        assert_eq!(first.id, second.id);
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn failed_lookup_falls_back_to_insert() {
        let store = InMemoryStore::new();
        store.set_reads_failing(true);
        let (resolver, _) = resolver(&store);

        let session = resolver.resolve(TOKEN, None).await;
        assert_eq!(session.origin, SessionOrigin::Created);
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn store_recovery_replaces_synthesized_id() {
        let store = InMemoryStore::new();
        store.set_writes_failing(true);
        let (resolver, _) = resolver(&store);
        let local = resolver.resolve(TOKEN, None).await;
        assert!(!local.is_persisted());

        store.set_writes_failing(false);
        let real = resolver.resolve(TOKEN, None).await;
        assert_eq!(real.origin, SessionOrigin::Created);
        assert_ne!(real.id, local.id);
    }

    #[tokio::test]
    async fn create_treats_duplicate_token_as_existing() {
        let store = InMemoryStore::new();
        let (resolver, _) = resolver(&store);

        let first = resolver.create(Language::En, Some(TOKEN.to_string())).await;
        let second = resolver.create(Language::En, Some(TOKEN.to_string())).await;
        assert!(first.persisted);
        assert!(second.persisted);
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn create_generates_a_token_when_missing() {
        let store = InMemoryStore::new();
        let (resolver, _) = resolver(&store);
        let created = resolver.create(Language::De, None).await;
        assert!(Uuid::parse_str(&created.session_token).is_ok());
    }

    #[tokio::test]
    async fn create_during_outage_still_returns_token() {
        let store = InMemoryStore::new();
        store.set_writes_failing(true);
        let (resolver, _) = resolver(&store);
        let created = resolver.create(Language::En, Some(TOKEN.to_string())).await;
        assert_eq!(created.session_token, TOKEN);
        assert!(!created.persisted);
    }

    #[tokio::test]
    async fn demographics_require_consent() {
        let store = InMemoryStore::new();
        let (resolver, _) = resolver(&store);
        let err = resolver
            .update_demographics(TOKEN, false, demographics())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn demographics_are_written_to_the_session() {
        let store = InMemoryStore::new();
        let (resolver, _) = resolver(&store);
        assert!(
            resolver
                .update_demographics(TOKEN, true, demographics())
                .await
                .unwrap()
        );

        let session = store.find_session(TOKEN).await.unwrap().unwrap();
        assert_eq!(session.age_group.as_deref(), Some("35-44"));
        assert!(session.previously_taken);
    }

    #[tokio::test]
    async fn demographics_are_staged_when_store_fails() {
        let store = InMemoryStore::new();
        let (resolver, fallback) = resolver(&store);
        resolver.resolve(TOKEN, None).await;
        store.set_writes_failing(true);

        let persisted = resolver
            .update_demographics(TOKEN, true, demographics())
            .await
            .unwrap();
        assert!(!persisted);
        assert_eq!(
            fallback.peek(&FallbackKey::demographics(TOKEN)),
            vec![StagedEntry::Demographics(demographics())]
        );
    }
}

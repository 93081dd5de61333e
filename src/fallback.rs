// src/fallback.rs

//! Side store for data that could not be written to the database.
//!
//! Writes that fail are staged here under the session token so nothing the
//! quiz-taker answered is lost. Entries stay until replay drains them or a
//! later successful write for the same slot unstages them.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use uuid::Uuid;

use crate::models::{response::LikertValue, session::Demographics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackKind {
    Responses,
    Results,
    Demographics,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FallbackKey {
    pub session_token: String,
    pub kind: FallbackKind,
}

impl FallbackKey {
    pub fn new(session_token: &str, kind: FallbackKind) -> Self {
        Self {
            session_token: session_token.to_string(),
            kind,
        }
    }

    pub fn responses(session_token: &str) -> Self {
        Self::new(session_token, FallbackKind::Responses)
    }

    pub fn results(session_token: &str) -> Self {
        Self::new(session_token, FallbackKind::Results)
    }

    pub fn demographics(session_token: &str) -> Self {
        Self::new(session_token, FallbackKind::Demographics)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StagedEntry {
    Response {
        test_id: Uuid,
        question_id: Uuid,
        value: LikertValue,
    },
    Result {
        test_id: Uuid,
        domain_id: Uuid,
        score: f64,
    },
    Demographics(Demographics),
}

impl StagedEntry {
    /// Whether `other` describes the same slot, in which case it replaces `self`.
    fn same_slot(&self, other: &StagedEntry) -> bool {
        match (self, other) {
            (
                StagedEntry::Response { test_id: t1, question_id: q1, .. },
                StagedEntry::Response { test_id: t2, question_id: q2, .. },
            ) => t1 == t2 && q1 == q2,
            (
                StagedEntry::Result { test_id: t1, domain_id: d1, .. },
                StagedEntry::Result { test_id: t2, domain_id: d2, .. },
            ) => t1 == t2 && d1 == d2,
            (StagedEntry::Demographics(_), StagedEntry::Demographics(_)) => true,
            _ => false,
        }
    }
}

/// Abstraction over the fallback side-channel, injected into the quiz services.
pub trait FallbackStore: Send + Sync {
    /// Stores `entry` under `key`; an entry for the same slot is replaced.
    fn stage(&self, key: &FallbackKey, entry: StagedEntry);

    /// Removes and returns everything staged under `key`.
    fn drain(&self, key: &FallbackKey) -> Vec<StagedEntry>;

    /// Returns a copy of everything staged under `key` without removing it.
    fn peek(&self, key: &FallbackKey) -> Vec<StagedEntry>;

    /// Drops the entry staged under `key` for the same slot as `written`.
    /// Called once the store holds a newer value for that slot.
    fn unstage(&self, key: &FallbackKey, written: &StagedEntry);
}

/// Process-local fallback store.
#[derive(Default)]
pub struct MemoryFallback {
    entries: Mutex<HashMap<FallbackKey, Vec<StagedEntry>>>,
}

impl MemoryFallback {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FallbackStore for MemoryFallback {
    fn stage(&self, key: &FallbackKey, entry: StagedEntry) {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let staged = guard.entry(key.clone()).or_default();
        match staged.iter_mut().find(|e| e.same_slot(&entry)) {
            Some(slot) => *slot = entry,
            None => staged.push(entry),
        }
    }

    fn drain(&self, key: &FallbackKey) -> Vec<StagedEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .unwrap_or_default()
    }

    fn peek(&self, key: &FallbackKey) -> Vec<StagedEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn unstage(&self, key: &FallbackKey, written: &StagedEntry) {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(staged) = guard.get_mut(key) {
            staged.retain(|e| !e.same_slot(written));
            if staged.is_empty() {
                guard.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(test_id: Uuid, question_id: Uuid, value: i16) -> StagedEntry {
        StagedEntry::Response {
            test_id,
            question_id,
            value: LikertValue::new(value).unwrap(),
        }
    }

    #[test]
    fn later_answer_replaces_earlier_one() {
        let store = MemoryFallback::new();
        let key = FallbackKey::responses("token-abcdef");
        let (test_id, q1, q2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        store.stage(&key, response(test_id, q1, 3));
        store.stage(&key, response(test_id, q2, 5));
        store.stage(&key, response(test_id, q1, 7));

        let staged = store.peek(&key);
        assert_eq!(staged.len(), 2);
        assert!(staged.contains(&response(test_id, q1, 7)));
    }

    #[test]
    fn drain_empties_the_key() {
        let store = MemoryFallback::new();
        let key = FallbackKey::results("token-abcdef");
        store.stage(
            &key,
            StagedEntry::Result {
                test_id: Uuid::new_v4(),
                domain_id: Uuid::new_v4(),
                score: 62.5,
            },
        );

        assert_eq!(store.drain(&key).len(), 1);
        assert!(store.drain(&key).is_empty());
    }

    #[test]
    fn unstage_only_removes_the_matching_slot() {
        let store = MemoryFallback::new();
        let key = FallbackKey::responses("token-abcdef");
        let (test_id, q1, q2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.stage(&key, response(test_id, q1, 3));
        store.stage(&key, response(test_id, q2, 5));

        // The value does not matter, only the slot.
        store.unstage(&key, &response(test_id, q1, 8));

        assert_eq!(store.peek(&key), vec![response(test_id, q2, 5)]);
        store.unstage(&key, &response(test_id, q2, 5));
        assert!(store.peek(&key).is_empty());
    }

    #[test]
    fn keys_are_isolated_per_token_and_kind() {
        let store = MemoryFallback::new();
        let test_id = Uuid::new_v4();
        store.stage(
            &FallbackKey::responses("token-one-1"),
            response(test_id, Uuid::new_v4(), 2),
        );

        assert!(store.peek(&FallbackKey::responses("token-two-2")).is_empty());
        assert!(store.peek(&FallbackKey::results("token-one-1")).is_empty());
    }
}

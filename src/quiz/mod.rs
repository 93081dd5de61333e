// src/quiz/mod.rs

//! Quiz flow: catalog reads, session resolution, answer recording and scoring.

pub mod catalog;
pub mod pager;
pub mod recorder;
pub mod replay;
pub mod scorer;
pub mod session;

use std::sync::Arc;

use crate::{fallback::FallbackStore, store::Storage};

use self::{
    catalog::CatalogReader, recorder::ResponseRecorder, replay::Replayer, scorer::Scorer,
    session::SessionResolver,
};

/// All quiz services sharing one store, one fallback store and one session cache.
#[derive(Clone)]
pub struct QuizService {
    pub catalog: CatalogReader,
    pub sessions: SessionResolver,
    pub recorder: ResponseRecorder,
    pub scorer: Scorer,
    pub replayer: Replayer,
}

impl QuizService {
    pub fn new(storage: Storage, fallback: Arc<dyn FallbackStore>, page_size: u32) -> Self {
        let catalog = CatalogReader::new(storage.catalog, page_size);
        let sessions = SessionResolver::new(storage.sessions, fallback.clone());
        let recorder = ResponseRecorder::new(
            sessions.clone(),
            catalog.clone(),
            storage.responses.clone(),
            fallback.clone(),
        );
        let scorer = Scorer::new(
            sessions.clone(),
            catalog.clone(),
            storage.responses.clone(),
            storage.results.clone(),
            fallback.clone(),
        );
        let replayer = Replayer::new(
            sessions.clone(),
            storage.responses,
            storage.results,
            fallback,
        );

        Self {
            catalog,
            sessions,
            recorder,
            scorer,
            replayer,
        }
    }
}

// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{catalog, quiz, session},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Catalog routes are read-only and keyed by test or domain id.
/// * Session routes are keyed by the client's session token.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE]);

    let catalog_routes = Router::new()
        .route("/tests", get(catalog::list_tests))
        .route("/tests/{id}", get(catalog::get_test))
        .route("/tests/{id}/domains", get(catalog::list_domains))
        .route("/tests/{id}/questions", get(catalog::questions_page))
        .route("/domains/{id}/facets", get(catalog::list_facets));

    let session_routes = Router::new()
        .route("/", post(session::create_session))
        .route("/{token}/demographics", put(session::update_demographics))
        .route("/{token}/responses", post(quiz::record_responses))
        .route(
            "/{token}/results",
            post(quiz::score).get(quiz::stored_results),
        )
        .route("/{token}/replay", post(quiz::replay));

    Router::new()
        .nest("/api", catalog_routes)
        .nest("/api/sessions", session_routes)
        // Global Middleware (applied top to bottom)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

pub mod correlation;
pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::catch_panic::CatchPanicLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    db::store::ReadingStore,
    readings::{QueryDefaults, ReadingService},
};
use handlers::ApiDoc;

/// State shared by every handler. Cheap to clone: the pool is reference counted.
#[derive(Debug, Clone)]
pub struct AppState {
    pub readings: ReadingService,
}

impl AppState {
    pub fn new(pool: PgPool, defaults: QueryDefaults) -> Self {
        Self {
            readings: ReadingService::new(ReadingStore::new(pool), defaults),
        }
    }
}

pub fn router(state: AppState) -> Router {
    instrument(routes(state))
}

/// Application routes without the request middleware.
pub(crate) fn routes(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/sense", post(handlers::submit_readings))
        .route("/read", get(handlers::read_readings))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}

/// Adds the 404 fallback, panic isolation and correlation ids. The
/// correlation layer is outermost so every response, including panics,
/// carries the request's id.
pub(crate) fn instrument(router: Router) -> Router {
    router
        .fallback(handlers::not_found)
        .layer(CatchPanicLayer::custom(errors::panic_response))
        .layer(middleware::from_fn(correlation::correlate))
}

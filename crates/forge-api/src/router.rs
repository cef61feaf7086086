//! Router assembly, split out of `main` so integration tests can build
//! the same router against fake stores (`sem_os_server/src/router.rs`'s
//! `build_router` split).

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/jobs", post(routes::jobs::create_job).get(routes::jobs::list_jobs))
        .route(
            "/jobs/:id",
            get(routes::jobs::get_job).delete(routes::jobs::delete_job),
        )
        .route("/jobs/:id/cancel", put(routes::jobs::cancel_job))
        .route("/jobs/:id/stream", get(routes::stream::stream_job))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

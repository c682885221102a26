use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.settings.upload.max_bytes;

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    let chat_routes = Router::new()
        .route("/upload", post(handlers::upload::upload_handler))
        .route("/run_demo", post(handlers::upload::run_demo_handler))
        .route("/send_message", post(handlers::chat::send_message_handler))
        .route("/stop", post(handlers::chat::stop_handler));

    Router::new()
        .merge(public_routes)
        .merge(chat_routes)
        .with_state(state)
        // CORS
        .layer(CorsLayer::permissive())
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        // Upload size cap
        .layer(DefaultBodyLimit::max(body_limit))
}

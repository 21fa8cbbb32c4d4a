pub use crate::keep_alive::keep_alive_handler;

use crate::keep_alive::failure_response;
use crate::state::AppState;
use axum::{
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;

pub async fn health_handler() -> impl IntoResponse {
    // Liveness of this process only; does not touch the database.
    Json(json!({ "status": "ok" }))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown error".to_string()
    };
    error!("Function error: {}", message);
    failure_response(message)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", any(keep_alive_handler))
        .route("/keep-alive", any(keep_alive_handler))
        .route("/health", get(health_handler))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

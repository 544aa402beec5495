use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    backend::{GenerationRequest, InferenceBackend},
    config::AppConfig,
    error::ServiceError,
    relay::relay_text,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backend: Arc<dyn InferenceBackend>,
}

pub fn build_router(config: Arc<AppConfig>, backend: Arc<dyn InferenceBackend>) -> Router {
    let state = AppState { config, backend };

    Router::new()
        .route("/health", get(health))
        .route("/api/generate", post(generate))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<Response, ServiceError> {
    info!(
        prompt_chars = request.prompt.chars().count(),
        model = %state.config.model_id,
        "relaying generation"
    );

    let upstream = state
        .backend
        .generate(&request.prompt)
        .await
        .inspect_err(|err| error!(%err, "could not start backend generation"))?;

    let body = Body::from_stream(relay_text(upstream));
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

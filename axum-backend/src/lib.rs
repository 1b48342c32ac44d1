//! HTTP boundary for the structure generation service.
//!
//! One inbound operation: `POST /generate` with `{"input": "<text>"}`
//! returns the generated layout as JSON. Empty or missing input is a
//! client error rejected before any pipeline stage runs.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use structure_model::ModelError;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub mod generation;
pub mod layout_extractor;

use generation::GenerationPipeline;
use layout_extractor::Layout;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Collaborator failures surface as unavailability; anything else that
/// escapes the pipeline is an internal fault.
fn status_for(error: &ModelError) -> StatusCode {
    match error {
        ModelError::Tokenizer(_) | ModelError::Load(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn generate_handler(
    State(pipeline): State<Arc<GenerationPipeline>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Layout>, (StatusCode, Json<ErrorBody>)> {
    if request.input.trim().is_empty() {
        warn!("generate request rejected: no input text");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "No input provided".to_string(),
            }),
        ));
    }

    info!(
        "received generate request with {} chars of input",
        request.input.len()
    );

    // Inference is CPU-bound; keep it off the async workers.
    let result = tokio::task::spawn_blocking(move || pipeline.generate(&request.input)).await;

    match result {
        Ok(Ok(layout)) => Ok(Json(layout)),
        Ok(Err(e)) => {
            warn!("generation failed: {e}");
            Err((
                status_for(&e),
                Json(ErrorBody {
                    error: format!("Generation failed: {e}"),
                }),
            ))
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: format!("Generation task failed: {e}"),
            }),
        )),
    }
}

/// Create the Axum app with all routes and middleware.
/// This is exposed for integration testing.
pub fn create_app(pipeline: Arc<GenerationPipeline>) -> Router {
    // Configure CORS from environment or use localhost for development
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:8080,http://127.0.0.1:8080".to_string());

    let origins: Vec<_> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors = if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/generate", post(generate_handler))
        .layer(cors)
        .with_state(pipeline)
}

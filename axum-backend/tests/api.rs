//! HTTP integration tests driving the router end to end.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use axum_backend::{create_app, generation::GenerationPipeline};
use structure_model::{FixedVolumeSource, ModelConfig, ModelContext, OccupancyGrid};

fn test_app() -> Router {
    let config = ModelConfig {
        grid_resolution: 8,
        seed: 123,
        ..ModelConfig::default()
    };
    let context = Arc::new(ModelContext::new(&config).expect("model context"));
    let source = FixedVolumeSource::new(OccupancyGrid::filled(8, 0.5));
    create_app(Arc::new(GenerationPipeline::new(context, Box::new(source))))
}

fn post_generate(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let response = test_app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn empty_input_is_a_client_error() {
    let response = test_app()
        .oneshot(post_generate(r#"{"input": ""}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "No input provided");
}

#[tokio::test]
async fn missing_input_is_a_client_error() {
    let response = test_app().oneshot(post_generate("{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "No input provided");
}

#[tokio::test]
async fn whitespace_input_is_a_client_error() {
    let response = test_app()
        .oneshot(post_generate(r#"{"input": "   "}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generate_returns_layout_wire_shape() {
    let response = test_app()
        .oneshot(post_generate(r#"{"input": "a small stone cottage"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["walls"].is_array());
    assert!(json["features"].is_array());
    assert_eq!(json["floor"]["width"], 16);
    assert_eq!(json["floor"]["length"], 16);
    assert_eq!(json["ceiling"]["width"], 16);
    assert_eq!(json["ceiling"]["length"], 16);
}

#[tokio::test]
async fn identical_requests_produce_identical_responses() {
    let app = test_app();
    let body = r#"{"input": "a timber cabin with two doors"}"#;

    let first = app.clone().oneshot(post_generate(body)).await.unwrap();
    let second = app.oneshot(post_generate(body)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);

    let first_bytes = axum::body::to_bytes(first.into_body(), usize::MAX)
        .await
        .unwrap();
    let second_bytes = axum::body::to_bytes(second.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(first_bytes, second_bytes);
}

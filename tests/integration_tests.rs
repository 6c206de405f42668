//! End-to-end tests over the full router: routing, error mapping, health
//! aggregation, and model swapping driven through the HTTP surface.

use axum_test::TestServer;
use embedding_gateway::backend::{SwappingBackend, SwappingConfig};
use embedding_gateway::registry::ModelRegistry;
use embedding_gateway::test_utils::{MockBackend, MockHttpClient, MockProcessController};
use embedding_gateway::{AppState, build_router};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn server_with(registry: ModelRegistry) -> TestServer {
    TestServer::new(build_router(AppState::new(registry))).unwrap()
}

#[tokio::test]
async fn embeddings_route_to_the_owning_backend() {
    let mut registry = ModelRegistry::new();
    let a = Arc::new(MockBackend::new(&["x"]));
    let b = Arc::new(MockBackend::new(&["y"]).with_vector(vec![0.5, 0.6]));
    registry.register_backend("a", a.clone());
    registry.register_backend("b", b.clone());
    registry.register_model("x", a.clone());
    registry.register_model("y", b.clone());
    let server = server_with(registry);

    let response = server
        .post("/v1/embeddings")
        .json(&json!({"input": "hi", "model": "y"}))
        .await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["object"], "list");
    assert_eq!(body["model"], "y");
    assert_eq!(body["data"][0]["embedding"], json!([0.5, 0.6]));

    assert_eq!(a.embed_calls.load(Ordering::SeqCst), 0);
    assert_eq!(b.embed_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn batch_input_preserves_ordering() {
    let mut registry = ModelRegistry::new();
    let backend = Arc::new(MockBackend::new(&["bge-m3"]));
    registry.register_backend("ollama", backend.clone());
    registry.register_model("bge-m3", backend);
    let server = server_with(registry);

    let response = server
        .post("/v1/embeddings")
        .json(&json!({"input": ["one", "two", "three"], "model": "bge-m3"}))
        .await;

    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 3);
    for (i, entry) in data.iter().enumerate() {
        assert_eq!(entry["index"], i);
        assert_eq!(entry["object"], "embedding");
    }
    assert_eq!(body["usage"]["prompt_tokens"], 3);
}

#[tokio::test]
async fn unknown_model_returns_404_with_known_models() {
    let mut registry = ModelRegistry::new();
    let backend = Arc::new(MockBackend::new(&[]));
    registry.register_model("bge-m3", backend.clone());
    registry.register_model("e5-large", backend);
    let server = server_with(registry);

    let response = server
        .post("/v1/embeddings")
        .json(&json!({"input": "hi", "model": "nonexistent-model-xyz"}))
        .await;

    assert_eq!(response.status_code(), 404);
    let body: serde_json::Value = response.json();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("bge-m3"));
    assert!(detail.contains("e5-large"));
}

#[tokio::test]
async fn prefix_resolution_serves_tagged_model_names() {
    let mut registry = ModelRegistry::new();
    let backend = Arc::new(MockBackend::new(&[]));
    registry.register_backend("ollama", backend.clone());
    registry.register_model("bge-m3", backend.clone());
    let server = server_with(registry);

    let response = server
        .post("/v1/embeddings")
        .json(&json!({"input": "hi", "model": "bge-m3:latest"}))
        .await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(backend.embed_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn backend_failure_maps_to_502() {
    let mut registry = ModelRegistry::new();
    let backend = Arc::new(MockBackend::new(&[]).with_failing_embed());
    registry.register_model("bge-m3", backend);
    let server = server_with(registry);

    let response = server
        .post("/v1/embeddings")
        .json(&json!({"input": "hi", "model": "bge-m3"}))
        .await;

    assert_eq!(response.status_code(), 502);
    let body: serde_json::Value = response.json();
    assert!(body["detail"].as_str().unwrap().contains("mock backend unavailable"));
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let mut registry = ModelRegistry::new();
    let backend = Arc::new(MockBackend::new(&[]));
    registry.register_model("bge-m3", backend.clone());
    let server = server_with(registry);

    let response = server
        .post("/v1/embeddings")
        .json(&json!({"input": [], "model": "bge-m3"}))
        .await;

    assert_eq!(response.status_code(), 400);
    assert_eq!(backend.embed_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn base64_encoding_is_rejected() {
    let mut registry = ModelRegistry::new();
    registry.register_model("bge-m3", Arc::new(MockBackend::new(&[])));
    let server = server_with(registry);

    let response = server
        .post("/v1/embeddings")
        .json(&json!({"input": "hi", "model": "bge-m3", "encoding_format": "base64"}))
        .await;

    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn models_listing_skips_failing_backends() {
    let mut registry = ModelRegistry::new();
    registry.register_backend("ollama", Arc::new(MockBackend::new(&["bge-m3"])));
    registry.register_backend(
        "tei",
        Arc::new(MockBackend::new(&["e5-large"]).with_failing_list()),
    );
    let server = server_with(registry);

    let response = server.get("/v1/models").await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    let models = body["data"].as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["id"], "bge-m3");
    assert_eq!(models[0]["backend"], "ollama");
}

#[tokio::test]
async fn health_is_degraded_when_any_backend_is_down() {
    let mut registry = ModelRegistry::new();
    registry.register_backend("ollama", Arc::new(MockBackend::new(&[])));
    registry.register_backend("tei", Arc::new(MockBackend::new(&[]).unhealthy()));
    let server = server_with(registry);

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 200);

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["backends"]["ollama"]["status"], "healthy");
    assert_eq!(body["backends"]["tei"]["status"], "unhealthy");
    assert!(body["backends"]["tei"]["error"].is_string());
}

#[tokio::test]
async fn health_is_healthy_when_all_backends_are_up() {
    let mut registry = ModelRegistry::new();
    registry.register_backend("ollama", Arc::new(MockBackend::new(&[])));
    registry.register_backend("tei", Arc::new(MockBackend::new(&[])));
    let server = server_with(registry);

    let response = server.get("/health").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn readiness_needs_only_one_healthy_backend() {
    let mut registry = ModelRegistry::new();
    registry.register_backend("ollama", Arc::new(MockBackend::new(&[]).unhealthy()));
    registry.register_backend("tei", Arc::new(MockBackend::new(&[])));
    let server = server_with(registry);

    let response = server.get("/health/ready").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn readiness_is_false_when_everything_is_down() {
    let mut registry = ModelRegistry::new();
    registry.register_backend("ollama", Arc::new(MockBackend::new(&[]).unhealthy()));
    let server = server_with(registry);

    let response = server.get("/health/ready").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["ready"], false);
}

#[tokio::test]
async fn uninitialized_registry_returns_503_and_not_ready() {
    let server = TestServer::new(build_router(AppState::uninitialized())).unwrap();

    let response = server
        .post("/v1/embeddings")
        .json(&json!({"input": "hi", "model": "bge-m3"}))
        .await;
    assert_eq!(response.status_code(), 503);

    let ready: serde_json::Value = server.get("/health/ready").await.json();
    assert_eq!(ready["ready"], false);

    let health: serde_json::Value = server.get("/health").await.json();
    assert_eq!(health["status"], "unhealthy");
}

const SWAP_EMBED_BODY: &str = r#"{
    "object": "list",
    "data": [{"object": "embedding", "embedding": [0.9, 0.8], "index": 0}],
    "model": "served",
    "usage": {"prompt_tokens": 1, "total_tokens": 1}
}"#;

/// A swap-managed backend wired into the registry: requesting its second
/// model over HTTP restarts the container exactly once, and an
/// out-of-range model is rejected without touching process control.
#[tokio::test]
async fn swapping_backend_swaps_through_the_http_surface() {
    let controller = MockProcessController::running();
    let running = controller.running.clone();
    let client = MockHttpClient::with_responder(move |req| {
        if req.uri.ends_with("/health") {
            if running.load(Ordering::SeqCst) {
                (axum::http::StatusCode::OK, String::new())
            } else {
                (axum::http::StatusCode::SERVICE_UNAVAILABLE, String::new())
            }
        } else if req.uri.ends_with("/info") {
            (
                axum::http::StatusCode::OK,
                r#"{"model_id": "intfloat/multilingual-e5-base"}"#.to_string(),
            )
        } else {
            (axum::http::StatusCode::OK, SWAP_EMBED_BODY.to_string())
        }
    });

    let config = SwappingConfig::builder()
        .base_url("http://localhost:8080".parse().unwrap())
        .container_name("tei-embeddings".to_string())
        .available_models(vec![
            "intfloat/multilingual-e5-base".to_string(),
            "nlpai-lab/KURE-v1".to_string(),
        ])
        .swap_timeout(Duration::from_millis(200))
        .poll_interval(Duration::from_millis(10))
        .request_timeout(Duration::from_secs(1))
        .health_timeout(Duration::from_millis(100))
        .build();

    let backend = Arc::new(SwappingBackend::new(config, client, controller.clone()));
    backend.initialize().await;

    let mut registry = ModelRegistry::new();
    registry.register_backend("tei", backend.clone());
    registry.register_model("intfloat/multilingual-e5-base", backend.clone());
    registry.register_model("nlpai-lab/KURE-v1", backend.clone());
    // Deliberately misregistered: mapped to this backend but outside its
    // configured set.
    registry.register_model("jinaai/jina-embeddings-v3", backend.clone());
    let server = server_with(registry);

    // Already-loaded model: no restart.
    let response = server
        .post("/v1/embeddings")
        .json(&json!({"input": "hi", "model": "intfloat/multilingual-e5-base"}))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(controller.start_calls.load(Ordering::SeqCst), 0);

    // Different configured model: exactly one restart.
    let response = server
        .post("/v1/embeddings")
        .json(&json!({"input": "hi", "model": "nlpai-lab/KURE-v1"}))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(controller.start_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        backend.current_model().await.as_deref(),
        Some("nlpai-lab/KURE-v1")
    );

    // Model outside the configured set: user error, no process calls.
    let response = server
        .post("/v1/embeddings")
        .json(&json!({"input": "hi", "model": "jinaai/jina-embeddings-v3"}))
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(controller.start_calls.load(Ordering::SeqCst), 1);

    // The swapping backend advertises its full configured set.
    let models: serde_json::Value = server.get("/v1/models").await.json();
    let ids: Vec<&str> = models["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec!["intfloat/multilingual-e5-base", "nlpai-lab/KURE-v1"]
    );

    // Health carries the currently-loaded model.
    let health: serde_json::Value = server.get("/health").await.json();
    assert_eq!(
        health["backends"]["tei"]["current_model"],
        "nlpai-lab/KURE-v1"
    );
}

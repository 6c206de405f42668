//! Embedding Gateway - a unified OpenAI-compatible embeddings API
//!
//! This library routes embedding requests to heterogeneous inference
//! backends (a local Ollama server, fixed-model inference servers, and
//! swappable-model servers that must be restarted to change models) behind
//! one registry and one wire format.

use axum::Router;
use axum::routing::{get, post};
use axum_prometheus::{
    GenericMetricLayer, Handle, PrometheusMetricLayerBuilder,
    metrics_exporter_prometheus::PrometheusHandle,
};
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, instrument};

pub mod backend;
pub mod client;
pub mod error;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod test_utils;

use handlers::{create_embeddings, health, list_models, readiness};
use registry::ModelRegistry;

/// Shared handler state: the model registry, set once after startup
/// registration and discovery complete. Requests arriving before
/// initialization are answered with 503.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    registry: Arc<OnceCell<ModelRegistry>>,
}

impl AppState {
    /// State with an already-initialized registry.
    pub fn new(registry: ModelRegistry) -> Self {
        let state = Self::uninitialized();
        state
            .initialize(registry)
            .expect("fresh state cannot be initialized twice");
        state
    }

    /// State whose registry will be supplied later via [`initialize`].
    ///
    /// [`initialize`]: AppState::initialize
    pub fn uninitialized() -> Self {
        Self {
            registry: Arc::new(OnceCell::new()),
        }
    }

    /// Install the registry. Fails if called more than once.
    pub fn initialize(&self, registry: ModelRegistry) -> anyhow::Result<()> {
        self.registry
            .set(registry)
            .map_err(|_| anyhow::anyhow!("registry already initialized"))
    }

    pub fn registry(&self) -> Option<&ModelRegistry> {
        self.registry.get()
    }
}

/// Build the main router:
/// - `POST /v1/embeddings` - embed a batch of texts
/// - `GET /v1/models` - aggregated model listing
/// - `GET /health` - per-backend health report
/// - `GET /health/ready` - readiness probe
#[instrument(skip(state))]
pub fn build_router(state: AppState) -> Router {
    info!("Building router");
    Router::new()
        .route("/v1/embeddings", post(create_embeddings))
        .route("/v1/models", get(list_models))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .with_state(state)
}

/// Builds a router for the metrics endpoint.
#[instrument(skip(handle))]
pub fn build_metrics_router(handle: PrometheusHandle) -> Router {
    info!("Building metrics router");
    Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    )
}

type MetricsLayerAndHandle = (
    GenericMetricLayer<'static, PrometheusHandle, Handle>,
    PrometheusHandle,
);

/// Builds a layer and handle for prometheus metrics collection. The prefix
/// must live for the program's duration, as the metrics layer requires.
pub fn build_metrics_layer_and_handle(
    prefix: impl Into<Cow<'static, str>>,
) -> MetricsLayerAndHandle {
    info!("Building metrics layer");
    PrometheusMetricLayerBuilder::new()
        .with_prefix(prefix)
        .enable_response_body_size(true)
        .with_endpoint_label_type(axum_prometheus::EndpointLabel::Exact)
        .with_default_metrics()
        .build_pair()
}

//! Axum handlers: the dispatch layer between the OpenAI-compatible HTTP
//! surface and the model registry.

use axum::{Json, extract::State};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::AppState;
use crate::backend::HealthStatus;
use crate::error::GatewayError;
use crate::models::{
    EmbeddingRequest, EmbeddingResponse, EncodingFormat, ListModelsResponse, ModelInfo,
};

/// `POST /v1/embeddings`
///
/// Resolves the backend via the registry and forwards the batch. Backend
/// failures are surfaced, never swallowed; there is no partial-batch
/// success.
#[instrument(skip(state, request), fields(model = %request.model))]
pub async fn create_embeddings(
    State(state): State<AppState>,
    Json(request): Json<EmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>, GatewayError> {
    let registry = state.registry().ok_or(GatewayError::NotReady)?;

    if request.encoding_format == EncodingFormat::Base64 {
        return Err(GatewayError::InvalidRequest(
            "encoding_format 'base64' is not supported".to_string(),
        ));
    }
    if request.dimensions == Some(0) {
        return Err(GatewayError::InvalidRequest(
            "dimensions must be a positive integer".to_string(),
        ));
    }

    let backend = registry
        .resolve(&request.model)
        .ok_or_else(|| GatewayError::ModelNotFound {
            model: request.model.clone(),
            available: registry.all_model_names(),
        })?;

    let texts = request.input.into_texts();
    if texts.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "input must contain at least one text".to_string(),
        ));
    }

    info!(batch = texts.len(), "dispatching embedding request");
    let response = backend
        .embed(&texts, &request.model, request.dimensions)
        .await?;
    Ok(Json(response))
}

/// `GET /v1/models`
///
/// Flattens every backend's catalog into one listing. Never errors: a
/// backend that fails to answer is skipped so partial outages degrade the
/// listing instead of failing it.
#[instrument(skip(state))]
pub async fn list_models(State(state): State<AppState>) -> Json<ListModelsResponse> {
    let Some(registry) = state.registry() else {
        return Json(ListModelsResponse::new(Vec::new()));
    };

    let catalogs = join_all(registry.backends().iter().map(|(name, backend)| async move {
        (name.clone(), backend.list_models().await)
    }))
    .await;

    let mut data = Vec::new();
    for (name, catalog) in catalogs {
        match catalog {
            Ok(models) => {
                data.extend(models.into_iter().map(|id| ModelInfo::new(id, &name)));
            }
            Err(e) => {
                warn!(backend = %name, error = %e, "model listing failed, skipping backend");
            }
        }
    }
    Json(ListModelsResponse::new(data))
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: OverallHealth,
    pub backends: BTreeMap<String, HealthStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

/// `GET /health`
///
/// Probes every backend; `degraded` overall as soon as any one is
/// unhealthy, `healthy` only when all are.
#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let Some(registry) = state.registry() else {
        return Json(HealthReport {
            status: OverallHealth::Unhealthy,
            backends: BTreeMap::new(),
            detail: Some("not initialized".to_string()),
        });
    };

    let checks = join_all(registry.backends().iter().map(|(name, backend)| async move {
        (name.clone(), backend.health_check().await)
    }))
    .await;

    let mut backends = BTreeMap::new();
    let mut status = OverallHealth::Healthy;
    for (name, check) in checks {
        if !check.is_healthy() {
            status = OverallHealth::Degraded;
        }
        backends.insert(name, check);
    }

    Json(HealthReport {
        status,
        backends,
        detail: None,
    })
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
}

/// `GET /health/ready`: true iff at least one backend is healthy.
#[instrument(skip(state))]
pub async fn readiness(State(state): State<AppState>) -> Json<ReadyResponse> {
    let Some(registry) = state.registry() else {
        return Json(ReadyResponse { ready: false });
    };

    let checks = join_all(
        registry
            .backends()
            .iter()
            .map(|(_, backend)| backend.health_check()),
    )
    .await;

    Json(ReadyResponse {
        ready: checks.iter().any(HealthStatus::is_healthy),
    })
}

//! Adapter for an OpenAI-compatible inference server that serves whatever
//! model it was started with (a TEI or vLLM instance managed outside the
//! gateway). A thin proxy: no swap logic, no internal model state.

use async_trait::async_trait;
use axum::http::Method;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{EmbeddingBackend, HealthStatus, join_url, openai_embed, request_json};
use crate::client::HttpClient;
use crate::error::BackendError;
use crate::models::EmbeddingResponse;

pub struct FixedBackend<C> {
    base_url: Url,
    /// Reported by `list_models` when the server's own introspection
    /// endpoint cannot be reached.
    default_model: String,
    client: C,
    request_timeout: Duration,
    health_timeout: Duration,
}

/// TEI-style `/info` introspection payload.
#[derive(Debug, Deserialize)]
struct InfoResponse {
    model_id: String,
}

impl<C: HttpClient> FixedBackend<C> {
    pub fn new(
        base_url: Url,
        default_model: impl Into<String>,
        client: C,
        request_timeout: Duration,
        health_timeout: Duration,
    ) -> Self {
        Self {
            base_url,
            default_model: default_model.into(),
            client,
            request_timeout,
            health_timeout,
        }
    }

    async fn query_loaded_model(&self) -> Option<String> {
        let url = join_url(&self.base_url, "info").ok()?;
        let (status, bytes) = request_json(
            &self.client,
            Method::GET,
            url,
            None::<&serde_json::Value>,
            self.health_timeout,
        )
        .await
        .ok()?;
        if !status.is_success() {
            return None;
        }
        let info: InfoResponse = serde_json::from_slice(&bytes).ok()?;
        Some(info.model_id)
    }
}

#[async_trait]
impl<C: HttpClient> EmbeddingBackend for FixedBackend<C> {
    async fn embed(
        &self,
        texts: &[String],
        model: &str,
        dimensions: Option<u32>,
    ) -> Result<EmbeddingResponse, BackendError> {
        openai_embed(
            &self.client,
            &self.base_url,
            texts,
            model,
            dimensions,
            self.request_timeout,
        )
        .await
    }

    async fn health_check(&self) -> HealthStatus {
        let url = match join_url(&self.base_url, "health") {
            Ok(url) => url,
            Err(e) => return HealthStatus::unhealthy(e.to_string()),
        };
        match request_json(
            &self.client,
            Method::GET,
            url,
            None::<&serde_json::Value>,
            self.health_timeout,
        )
        .await
        {
            Ok((status, _)) if status.is_success() => HealthStatus::healthy(),
            Ok((status, _)) => HealthStatus::unhealthy(format!("HTTP {}", status.as_u16())),
            Err(e) => HealthStatus::unhealthy(e.to_string()),
        }
    }

    /// The remote's own report of its loaded model, falling back to the
    /// configured default when the introspection endpoint is unreachable.
    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        match self.query_loaded_model().await {
            Some(model) => Ok(vec![model]),
            None => {
                debug!(
                    default = %self.default_model,
                    "introspection endpoint unavailable, reporting configured default"
                );
                Ok(vec![self.default_model.clone()])
            }
        }
    }
}

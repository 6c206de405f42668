//! Adapter for an inference server whose loaded model can only change by
//! restarting its container with a different load target.
//!
//! The swap is expensive (seconds to minutes) and must never run twice for
//! the same transition. Requests for the already-loaded model take a
//! lock-free fast path; requests needing a different model serialize on a
//! per-instance lock and piggyback on whichever swap completes first.

use async_trait::async_trait;
use axum::http::Method;
use bon::Builder;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use super::process::ProcessController;
use super::{EmbeddingBackend, HealthStatus, join_url, openai_embed, request_json};
use crate::client::HttpClient;
use crate::error::BackendError;
use crate::models::EmbeddingResponse;

#[derive(Debug, Clone, Builder)]
pub struct SwappingConfig {
    pub base_url: Url,
    /// Name the inference container is started and removed under.
    pub container_name: String,
    /// The only models this backend is allowed to load.
    pub available_models: Vec<String>,
    /// Overall deadline for a restarted process to report healthy.
    #[builder(default = Duration::from_secs(600))]
    pub swap_timeout: Duration,
    /// Interval between health probes while waiting for a restart.
    #[builder(default = Duration::from_secs(2))]
    pub poll_interval: Duration,
    #[builder(default = Duration::from_secs(120))]
    pub request_timeout: Duration,
    /// Per-probe timeout, distinct from the overall swap deadline.
    #[builder(default = Duration::from_secs(5))]
    pub health_timeout: Duration,
}

pub struct SwappingBackend<C, P> {
    config: SwappingConfig,
    client: C,
    controller: P,
    /// Model believed loaded. May be stale right after a restart this
    /// instance did not initiate.
    current: RwLock<Option<String>>,
    /// At most one swap in flight per instance; `current` is written only
    /// by the caller that completed the latest successful swap, under this
    /// lock.
    swap_lock: Mutex<()>,
}

/// TEI-style `/info` introspection payload.
#[derive(Debug, Deserialize)]
struct InfoResponse {
    model_id: String,
}

impl<C: HttpClient, P: ProcessController> SwappingBackend<C, P> {
    pub fn new(config: SwappingConfig, client: C, controller: P) -> Self {
        Self {
            config,
            client,
            controller,
            current: RwLock::new(None),
            swap_lock: Mutex::new(()),
        }
    }

    /// Seed `current` from the running container's introspection endpoint,
    /// so an instance left over from a previous gateway run is not
    /// pointlessly restarted.
    pub async fn initialize(&self) {
        match self.detect_loaded_model().await {
            Some(model) => {
                info!(model = %model, "detected already-loaded model");
                *self.current.write().await = Some(model);
            }
            None => {
                info!(container = %self.config.container_name, "inference container not running or not healthy");
            }
        }
    }

    pub async fn current_model(&self) -> Option<String> {
        self.current.read().await.clone()
    }

    async fn detect_loaded_model(&self) -> Option<String> {
        let url = join_url(&self.config.base_url, "info").ok()?;
        let (status, bytes) = request_json(
            &self.client,
            Method::GET,
            url,
            None::<&serde_json::Value>,
            self.config.health_timeout,
        )
        .await
        .ok()?;
        if !status.is_success() {
            return None;
        }
        let info: InfoResponse = serde_json::from_slice(&bytes).ok()?;
        Some(info.model_id)
    }

    /// Make `model` the loaded model, restarting the container if needed.
    async fn ensure_model(&self, model: &str) -> Result<(), BackendError> {
        // Fast path, no coordination: the overwhelmingly common case.
        if self.current.read().await.as_deref() == Some(model) {
            return Ok(());
        }

        // Fail fast before taking the lock or touching the process.
        if !self.config.available_models.iter().any(|m| m == model) {
            return Err(BackendError::UnsupportedModel(model.to_string()));
        }

        let _guard = self.swap_lock.lock().await;

        // A concurrent caller may have completed this exact swap while we
        // waited on the lock.
        if self.current.read().await.as_deref() == Some(model) {
            debug!(model = %model, "swap already completed by concurrent request");
            return Ok(());
        }

        let previous = self.current.read().await.clone();
        info!(
            from = previous.as_deref().unwrap_or("(none)"),
            to = %model,
            "swapping model"
        );

        // Best-effort stop: "already stopped" is benign.
        if let Err(e) = self.controller.stop(&self.config.container_name).await {
            warn!(
                container = %self.config.container_name,
                error = %e,
                "container stop failed, continuing with start"
            );
        }

        self.controller
            .start(&self.config.container_name, model)
            .await
            .map_err(|e| BackendError::Swap {
                model: model.to_string(),
                reason: e.to_string(),
            })?;

        info!(container = %self.config.container_name, "container started, waiting for health");
        self.wait_healthy(model).await?;

        *self.current.write().await = Some(model.to_string());
        info!(model = %model, "model swap complete");
        Ok(())
    }

    /// Poll the health endpoint at a fixed interval until it reports
    /// healthy or the swap deadline elapses. On timeout the process is left
    /// in an unknown state and `current` is not updated.
    async fn wait_healthy(&self, model: &str) -> Result<(), BackendError> {
        let deadline = Instant::now() + self.config.swap_timeout;
        loop {
            if self.probe_health().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BackendError::SwapTimeout {
                    model: model.to_string(),
                    deadline: self.config.swap_timeout,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn probe_health(&self) -> bool {
        let Ok(url) = join_url(&self.config.base_url, "health") else {
            return false;
        };
        matches!(
            request_json(
                &self.client,
                Method::GET,
                url,
                None::<&serde_json::Value>,
                self.config.health_timeout,
            )
            .await,
            Ok((status, _)) if status.is_success()
        )
    }
}

#[async_trait]
impl<C: HttpClient, P: ProcessController> EmbeddingBackend for SwappingBackend<C, P> {
    async fn embed(
        &self,
        texts: &[String],
        model: &str,
        dimensions: Option<u32>,
    ) -> Result<EmbeddingResponse, BackendError> {
        self.ensure_model(model).await?;

        // The embedding call itself runs outside the swap lock.
        openai_embed(
            &self.client,
            &self.config.base_url,
            texts,
            model,
            dimensions,
            self.config.request_timeout,
        )
        .await
    }

    async fn health_check(&self) -> HealthStatus {
        let current = self.current.read().await.clone();
        let status = if self.probe_health().await {
            HealthStatus::healthy()
        } else {
            HealthStatus::unhealthy("health probe failed")
        };
        status.with_current_model(current)
    }

    /// The static configured set, independent of which model is loaded.
    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.config.available_models.clone())
    }
}

//! Backend abstraction: the capability contract every inference backend
//! implements, plus the HTTP plumbing they share.
//!
//! A backend is one remote inference service reachable over HTTP. Very
//! different behaviors (stateless proxy vs. swap-on-demand proxy) hide
//! behind the same four operations.

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Method, StatusCode, header::CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::client::HttpClient;
use crate::error::BackendError;
use crate::models::EmbeddingResponse;

pub mod fixed;
pub mod ollama;
pub mod process;
pub mod swapping;

pub use fixed::FixedBackend;
pub use ollama::OllamaBackend;
pub use swapping::{SwappingBackend, SwappingConfig};

/// Capability set implemented uniformly by every backend variant.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a non-empty ordered batch of texts with the given model.
    ///
    /// When `dimensions` is set, each returned vector is truncated to that
    /// many leading components; short vectors are never padded. The whole
    /// batch fails or succeeds together.
    async fn embed(
        &self,
        texts: &[String],
        model: &str,
        dimensions: Option<u32>,
    ) -> Result<EmbeddingResponse, BackendError>;

    /// Probe the remote service. Never fails: transport errors are folded
    /// into an unhealthy status with the failure detail attached.
    async fn health_check(&self) -> HealthStatus;

    /// The model identifiers this backend currently knows or can load.
    async fn list_models(&self) -> Result<Vec<String>, BackendError>;

    /// Release underlying resources. Idempotent; connection pools are also
    /// torn down on drop, so the default is a no-op.
    async fn close(&self) {}
}

/// Outcome of a health probe.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthStatus {
    pub status: Health,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            status: Health::Healthy,
            error: None,
            current_model: None,
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            status: Health::Unhealthy,
            error: Some(detail.into()),
            current_model: None,
        }
    }

    pub fn with_current_model(mut self, model: Option<String>) -> Self {
        self.current_model = model;
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == Health::Healthy
    }
}

/// Truncate to the leading `dimensions` components when the vector is
/// longer; short vectors are left untouched.
pub(crate) fn truncate_dimensions(embedding: &mut Vec<f32>, dimensions: Option<u32>) {
    if let Some(dim) = dimensions {
        let dim = dim as usize;
        if embedding.len() > dim {
            embedding.truncate(dim);
        }
    }
}

/// Upstream error bodies are clipped so one failing backend can't flood the
/// gateway's own error responses.
const ERROR_DETAIL_LIMIT: usize = 500;

pub(crate) fn clip_detail(body: &Bytes) -> String {
    let text = String::from_utf8_lossy(body);
    let mut detail: String = text.chars().take(ERROR_DETAIL_LIMIT).collect();
    if text.chars().count() > ERROR_DETAIL_LIMIT {
        detail.push('…');
    }
    detail
}

/// Send one JSON request to a backend and collect the response body.
///
/// Every outbound call carries an explicit timeout; elapsing it is a
/// transport failure, never a hang.
pub(crate) async fn request_json<C: HttpClient>(
    client: &C,
    method: Method,
    url: Url,
    body: Option<&impl Serialize>,
    timeout: Duration,
) -> Result<(StatusCode, Bytes), BackendError> {
    let builder = axum::http::Request::builder()
        .method(method)
        .uri(url.as_str());

    let request = match body {
        Some(value) => {
            let encoded = serde_json::to_vec(value)
                .map_err(|e| BackendError::Transport(format!("failed to encode body: {e}")))?;
            builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(encoded))
        }
        None => builder.body(Body::empty()),
    }
    .map_err(|e| BackendError::Transport(format!("failed to build request: {e}")))?;

    let response = tokio::time::timeout(timeout, client.request(request))
        .await
        .map_err(|_| BackendError::Transport(format!("request to {url} timed out after {timeout:?}")))?
        .map_err(|e| BackendError::Transport(e.to_string()))?;

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| BackendError::Transport(format!("failed to read response body: {e}")))?;

    Ok((status, bytes))
}

/// The embedding call shared by the OpenAI-compatible backends: POST
/// `{base}/v1/embeddings`, parse the standard shape, apply dimension
/// truncation, echo the requested model.
pub(crate) async fn openai_embed<C: HttpClient>(
    client: &C,
    base_url: &Url,
    texts: &[String],
    model: &str,
    dimensions: Option<u32>,
    timeout: Duration,
) -> Result<EmbeddingResponse, BackendError> {
    let url = join_url(base_url, "v1/embeddings")?;
    let payload = serde_json::json!({ "input": texts, "model": model });
    let (status, bytes) = request_json(client, Method::POST, url, Some(&payload), timeout).await?;

    if !status.is_success() {
        return Err(BackendError::Upstream {
            status: status.as_u16(),
            detail: clip_detail(&bytes),
        });
    }

    let mut response: EmbeddingResponse = serde_json::from_slice(&bytes)
        .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
    for data in &mut response.data {
        truncate_dimensions(&mut data.embedding, dimensions);
    }
    response.model = model.to_string();
    Ok(response)
}

pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url, BackendError> {
    base.join(path)
        .map_err(|e| BackendError::Transport(format!("invalid backend URL: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1024, Some(256), 256)]
    #[case(3, Some(10), 3)]
    #[case(8, None, 8)]
    #[case(4, Some(4), 4)]
    fn truncation_never_pads(
        #[case] len: usize,
        #[case] dimensions: Option<u32>,
        #[case] expected: usize,
    ) {
        let mut embedding = vec![0.0_f32; len];
        truncate_dimensions(&mut embedding, dimensions);
        assert_eq!(embedding.len(), expected);
    }

    #[test]
    fn truncation_keeps_leading_components() {
        let mut embedding = vec![1.0, 2.0, 3.0, 4.0];
        truncate_dimensions(&mut embedding, Some(2));
        assert_eq!(embedding, vec![1.0, 2.0]);
    }

    #[test]
    fn clip_detail_limits_long_bodies() {
        let body = Bytes::from("x".repeat(600));
        let detail = clip_detail(&body);
        assert_eq!(detail.chars().count(), 501);
        assert!(detail.ends_with('…'));

        let short = Bytes::from_static(b"boom");
        assert_eq!(clip_detail(&short), "boom");
    }
}

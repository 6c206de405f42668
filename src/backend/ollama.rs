//! Adapter for a locally-running Ollama model server.
//!
//! Ollama loads models on demand, so there is no swap coordination here:
//! the gateway forwards the batch to `/api/embed` and reshapes the reply
//! into the OpenAI wire format.

use async_trait::async_trait;
use axum::http::Method;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{
    EmbeddingBackend, HealthStatus, clip_detail, join_url, request_json, truncate_dimensions,
};
use crate::client::HttpClient;
use crate::error::BackendError;
use crate::models::{EmbeddingData, EmbeddingResponse, Usage};

pub struct OllamaBackend<C> {
    base_url: Url,
    client: C,
    request_timeout: Duration,
    health_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelTag {
    name: String,
}

impl<C: HttpClient> OllamaBackend<C> {
    pub fn new(
        base_url: Url,
        client: C,
        request_timeout: Duration,
        health_timeout: Duration,
    ) -> Self {
        Self {
            base_url,
            client,
            request_timeout,
            health_timeout,
        }
    }
}

#[async_trait]
impl<C: HttpClient> EmbeddingBackend for OllamaBackend<C> {
    async fn embed(
        &self,
        texts: &[String],
        model: &str,
        dimensions: Option<u32>,
    ) -> Result<EmbeddingResponse, BackendError> {
        let url = join_url(&self.base_url, "api/embed")?;
        let payload = serde_json::json!({ "model": model, "input": texts });
        let (status, bytes) = request_json(
            &self.client,
            Method::POST,
            url,
            Some(&payload),
            self.request_timeout,
        )
        .await?;

        if !status.is_success() {
            return Err(BackendError::Upstream {
                status: status.as_u16(),
                detail: clip_detail(&bytes),
            });
        }

        let parsed: OllamaEmbedResponse = serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        let data = parsed
            .embeddings
            .into_iter()
            .enumerate()
            .map(|(index, mut embedding)| {
                truncate_dimensions(&mut embedding, dimensions);
                EmbeddingData::new(embedding, index)
            })
            .collect();

        // Ollama only reports the prompt evaluation count.
        let usage = Usage {
            prompt_tokens: parsed.prompt_eval_count,
            total_tokens: parsed.prompt_eval_count,
        };

        Ok(EmbeddingResponse::new(data, model, usage))
    }

    async fn health_check(&self) -> HealthStatus {
        let url = match join_url(&self.base_url, "") {
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

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let url = join_url(&self.base_url, "api/tags")?;
        let (status, bytes) = request_json(
            &self.client,
            Method::GET,
            url,
            None::<&serde_json::Value>,
            self.request_timeout,
        )
        .await?;

        if !status.is_success() {
            return Err(BackendError::Upstream {
                status: status.as_u16(),
                detail: clip_detail(&bytes),
            });
        }

        let parsed: OllamaTagsResponse = serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockHttpClient;
    use axum::http::StatusCode;

    fn backend(client: MockHttpClient) -> OllamaBackend<MockHttpClient> {
        OllamaBackend::new(
            "http://localhost:11434".parse().unwrap(),
            client,
            Duration::from_secs(5),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn embed_reshapes_ollama_response() {
        let client = MockHttpClient::new(
            StatusCode::OK,
            r#"{"embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]], "prompt_eval_count": 7}"#,
        );
        let backend = backend(client.clone());

        let response = backend
            .embed(&["a".to_string(), "b".to_string()], "bge-m3", None)
            .await
            .unwrap();

        assert_eq!(response.model, "bge-m3");
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[0].index, 0);
        assert_eq!(response.data[1].index, 1);
        assert_eq!(response.data[1].embedding, vec![0.4, 0.5, 0.6]);
        assert_eq!(response.usage.prompt_tokens, 7);
        assert_eq!(response.usage.total_tokens, 7);

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].uri.ends_with("/api/embed"));
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "bge-m3");
        assert_eq!(body["input"][1], "b");
    }

    #[tokio::test]
    async fn embed_truncates_to_requested_dimensions() {
        let client = MockHttpClient::new(
            StatusCode::OK,
            r#"{"embeddings": [[0.1, 0.2, 0.3, 0.4]], "prompt_eval_count": 2}"#,
        );
        let backend = backend(client);

        let response = backend
            .embed(&["a".to_string()], "bge-m3", Some(2))
            .await
            .unwrap();
        assert_eq!(response.data[0].embedding, vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn embed_surfaces_upstream_status() {
        let client = MockHttpClient::new(StatusCode::INTERNAL_SERVER_ERROR, "model load failed");
        let backend = backend(client);

        let err = backend
            .embed(&["a".to_string()], "bge-m3", None)
            .await
            .unwrap_err();
        match err {
            BackendError::Upstream { status, detail } => {
                assert_eq!(status, 500);
                assert_eq!(detail, "model load failed");
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_models_parses_tags() {
        let client = MockHttpClient::new(
            StatusCode::OK,
            r#"{"models": [{"name": "bge-m3:latest"}, {"name": "nomic-embed-text:latest"}]}"#,
        );
        let backend = backend(client);

        let models = backend.list_models().await.unwrap();
        assert_eq!(models, vec!["bge-m3:latest", "nomic-embed-text:latest"]);
    }

    #[tokio::test]
    async fn health_check_never_fails() {
        let backend = backend(MockHttpClient::failing("connection refused"));
        let status = backend.health_check().await;
        assert!(!status.is_healthy());
        assert!(status.error.unwrap().contains("connection refused"));
    }
}

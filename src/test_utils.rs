//! Mock implementations shared by unit and integration tests: an
//! `HttpClient` that records requests and serves canned responses, a
//! `ProcessController` that counts lifecycle calls instead of touching
//! Docker, and a canned `EmbeddingBackend`.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::StatusCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backend::process::ProcessController;
use crate::backend::{EmbeddingBackend, HealthStatus, truncate_dimensions};
use crate::client::HttpClient;
use crate::error::BackendError;
use crate::models::{EmbeddingData, EmbeddingResponse, Usage};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub uri: String,
    pub body: Vec<u8>,
}

type Responder = dyn Fn(&RecordedRequest) -> (StatusCode, String) + Send + Sync;

/// An [`HttpClient`] that records every request and answers from a
/// responder closure.
pub struct MockHttpClient {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responder: Arc<Responder>,
    failure: Option<String>,
}

impl MockHttpClient {
    /// Answer every request with a fixed status and body.
    pub fn new(status: StatusCode, body: &str) -> Self {
        let body = body.to_string();
        Self::with_responder(move |_| (status, body.clone()))
    }

    /// Answer per-request, e.g. by matching on the URI.
    pub fn with_responder(
        responder: impl Fn(&RecordedRequest) -> (StatusCode, String) + Send + Sync + 'static,
    ) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
            failure: None,
        }
    }

    /// Fail every request at the transport level.
    pub fn failing(message: &str) -> Self {
        let mut client = Self::new(StatusCode::OK, "");
        client.failure = Some(message.to_string());
        client
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Clone for MockHttpClient {
    fn clone(&self) -> Self {
        Self {
            requests: Arc::clone(&self.requests),
            responder: Arc::clone(&self.responder),
            failure: self.failure.clone(),
        }
    }
}

impl std::fmt::Debug for MockHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHttpClient")
            .field("requests", &self.requests)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn request(
        &self,
        req: axum::extract::Request,
    ) -> Result<axum::response::Response, Box<dyn std::error::Error + Send + Sync>> {
        let method = req.method().to_string();
        let uri = req.uri().to_string();
        let body = axum::body::to_bytes(req.into_body(), usize::MAX)
            .await
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?
            .to_vec();

        let recorded = RecordedRequest { method, uri, body };
        self.requests.lock().unwrap().push(recorded.clone());

        if let Some(message) = &self.failure {
            return Err(Box::new(std::io::Error::other(message.clone())));
        }

        let (status, body) = (self.responder)(&recorded);
        Ok(axum::response::Response::builder()
            .status(status)
            .body(Body::from(body))
            .unwrap())
    }
}

/// A [`ProcessController`] that flips a shared `running` flag instead of
/// driving Docker, so tests can wire a mock health endpoint to the
/// container lifecycle and count restarts.
#[derive(Debug, Clone)]
pub struct MockProcessController {
    pub stop_calls: Arc<AtomicUsize>,
    pub start_calls: Arc<AtomicUsize>,
    pub running: Arc<AtomicBool>,
    fail_stop: bool,
    fail_start: bool,
    unhealthy_after_start: bool,
    start_delay: Option<Duration>,
}

impl MockProcessController {
    /// A controller whose container is already up and healthy.
    pub fn running() -> Self {
        Self {
            stop_calls: Arc::new(AtomicUsize::new(0)),
            start_calls: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicBool::new(true)),
            fail_stop: false,
            fail_start: false,
            unhealthy_after_start: false,
            start_delay: None,
        }
    }

    pub fn with_failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn with_failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Starts "succeed" but the container never reports healthy.
    pub fn with_unhealthy_after_start(mut self) -> Self {
        self.unhealthy_after_start = true;
        self
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }
}

#[async_trait]
impl ProcessController for MockProcessController {
    async fn stop(&self, _name: &str) -> anyhow::Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            anyhow::bail!("no such container");
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self, _name: &str, _model: &str) -> anyhow::Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            anyhow::bail!("docker run exited with status 125");
        }
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        self.running
            .store(!self.unhealthy_after_start, Ordering::SeqCst);
        Ok(())
    }
}

/// A canned [`EmbeddingBackend`] for registry and handler tests.
pub struct MockBackend {
    models: Vec<String>,
    vector: Vec<f32>,
    healthy: bool,
    fail_list: bool,
    fail_embed: bool,
    pub embed_calls: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new(models: &[&str]) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            vector: vec![0.1, 0.2, 0.3],
            healthy: true,
            fail_list: false,
            fail_embed: false,
            embed_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The vector returned for every input text.
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = vector;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn with_failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn with_failing_embed(mut self) -> Self {
        self.fail_embed = true;
        self
    }
}

#[async_trait]
impl EmbeddingBackend for MockBackend {
    async fn embed(
        &self,
        texts: &[String],
        model: &str,
        dimensions: Option<u32>,
    ) -> Result<EmbeddingResponse, BackendError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(BackendError::Transport("mock backend unavailable".into()));
        }
        let data = texts
            .iter()
            .enumerate()
            .map(|(index, _)| {
                let mut vector = self.vector.clone();
                truncate_dimensions(&mut vector, dimensions);
                EmbeddingData::new(vector, index)
            })
            .collect();
        Ok(EmbeddingResponse::new(
            data,
            model,
            Usage {
                prompt_tokens: texts.len() as u64,
                total_tokens: texts.len() as u64,
            },
        ))
    }

    async fn health_check(&self) -> HealthStatus {
        if self.healthy {
            HealthStatus::healthy()
        } else {
            HealthStatus::unhealthy("mock backend down")
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        if self.fail_list {
            return Err(BackendError::Transport("mock backend offline".into()));
        }
        Ok(self.models.clone())
    }
}

//! The in-memory mapping from model identifier to backend instance.
//!
//! Populated once at startup (static registrations plus one best-effort
//! discovery pass), then shared read-only for the life of the process, so
//! the request path takes no locks.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::backend::EmbeddingBackend;

#[derive(Default)]
pub struct ModelRegistry {
    /// Registration order is meaningful: `/health` and `/v1/models` report
    /// backends in this order, and the prefix fallback scans models in it.
    backends: Vec<(String, Arc<dyn EmbeddingBackend>)>,
    model_map: Vec<(String, Arc<dyn EmbeddingBackend>)>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the named backend.
    pub fn register_backend(&mut self, name: impl Into<String>, backend: Arc<dyn EmbeddingBackend>) {
        let name = name.into();
        match self.backends.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = backend,
            None => self.backends.push((name, backend)),
        }
    }

    /// Insert or overwrite the mapping. Last write wins; an overwritten key
    /// keeps its original position in the scan order. No cross-backend
    /// uniqueness is enforced.
    pub fn register_model(&mut self, model: impl Into<String>, backend: Arc<dyn EmbeddingBackend>) {
        let model = model.into();
        match self.model_map.iter_mut().find(|(m, _)| *m == model) {
            Some(entry) => entry.1 = backend,
            None => self.model_map.push((model, backend)),
        }
    }

    /// Exact match first; otherwise the first registered entry where either
    /// the query is a prefix of the registered key or vice versa (so
    /// `bge-m3:latest` matches a registration of `bge-m3`). First
    /// structural match wins, not longest: on ambiguous prefixes the choice
    /// is registration-order-dependent.
    pub fn resolve(&self, model: &str) -> Option<Arc<dyn EmbeddingBackend>> {
        if let Some((_, backend)) = self.model_map.iter().find(|(m, _)| m == model) {
            return Some(Arc::clone(backend));
        }
        self.model_map
            .iter()
            .find(|(registered, _)| model.starts_with(registered) || registered.starts_with(model))
            .map(|(_, backend)| Arc::clone(backend))
    }

    /// Ask every backend for its own model catalog and register any unseen
    /// identifiers. Advisory: a backend that fails to answer contributes
    /// nothing and is not retried.
    pub async fn discover_models(&mut self) {
        let backends: Vec<(String, Arc<dyn EmbeddingBackend>)> = self
            .backends
            .iter()
            .map(|(n, b)| (n.clone(), Arc::clone(b)))
            .collect();

        for (name, backend) in backends {
            match backend.list_models().await {
                Ok(models) => {
                    for model in models {
                        if !self.model_map.iter().any(|(m, _)| *m == model) {
                            debug!(backend = %name, model = %model, "discovered model");
                            self.register_model(model, Arc::clone(&backend));
                        }
                    }
                }
                Err(e) => {
                    debug!(backend = %name, error = %e, "model discovery failed, skipping backend");
                }
            }
        }
    }

    pub fn all_model_names(&self) -> Vec<String> {
        self.model_map.iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn backends(&self) -> &[(String, Arc<dyn EmbeddingBackend>)] {
        &self.backends
    }

    /// Release every backend's resources. Idempotent.
    pub async fn close_all(&self) {
        for (_, backend) in &self.backends {
            backend.close().await;
        }
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field(
                "backends",
                &self.backends.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("models", &self.all_model_names())
            .finish()
    }
}

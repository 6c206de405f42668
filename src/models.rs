/// Wire types for the OpenAI-compatible embeddings API.
///
/// The same response shapes are used both for parsing upstream replies from
/// OpenAI-compatible inference servers and for serializing the gateway's own
/// responses, so the defaults are lenient on the fields upstreams omit.
use serde::{Deserialize, Serialize};

/// Request body for `POST /v1/embeddings`.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingRequest {
    /// Input text to embed, either a single string or a batch of strings.
    pub input: EmbeddingInput,
    /// The model to route the request to.
    pub model: String,
    /// Encoding format for the returned vectors. Only `float` is served.
    #[serde(default)]
    pub encoding_format: EncodingFormat,
    /// Truncate each returned vector to this many leading components.
    pub dimensions: Option<u32>,
}

/// The `input` field accepts a scalar or a sequence.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

impl EmbeddingInput {
    /// Normalize into an ordered batch of texts.
    pub fn into_texts(self) -> Vec<String> {
        match self {
            EmbeddingInput::Single(text) => vec![text],
            EmbeddingInput::Batch(texts) => texts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    #[default]
    Float,
    Base64,
}

/// One embedding vector, index-aligned with the request's input ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingData {
    #[serde(default = "embedding_object")]
    pub object: String,
    pub embedding: Vec<f32>,
    pub index: usize,
}

impl EmbeddingData {
    pub fn new(embedding: Vec<f32>, index: usize) -> Self {
        Self {
            object: embedding_object(),
            embedding,
            index,
        }
    }
}

/// Token counts as reported by the backend. Zero when the backend does not
/// report usage, never fabricated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Response body for `POST /v1/embeddings`, also the shape returned by
/// OpenAI-compatible upstream servers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingResponse {
    #[serde(default = "list_object")]
    pub object: String,
    pub data: Vec<EmbeddingData>,
    pub model: String,
    #[serde(default)]
    pub usage: Usage,
}

impl EmbeddingResponse {
    pub fn new(data: Vec<EmbeddingData>, model: impl Into<String>, usage: Usage) -> Self {
        Self {
            object: list_object(),
            data,
            model: model.into(),
            usage,
        }
    }
}

/// One entry of the `/v1/models` listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    /// The backend that owns this model.
    pub owned_by: String,
    pub backend: String,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, backend: impl Into<String>) -> Self {
        let backend = backend.into();
        Self {
            id: id.into(),
            object: "model".to_string(),
            owned_by: backend.clone(),
            backend,
        }
    }
}

/// Response body for `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListModelsResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl ListModelsResponse {
    pub fn new(data: Vec<ModelInfo>) -> Self {
        Self {
            object: list_object(),
            data,
        }
    }
}

fn embedding_object() -> String {
    "embedding".to_string()
}

fn list_object() -> String {
    "list".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_accepts_scalar_and_batch() {
        let scalar: EmbeddingRequest =
            serde_json::from_value(json!({"input": "hello", "model": "bge-m3"})).unwrap();
        assert_eq!(scalar.input.into_texts(), vec!["hello".to_string()]);

        let batch: EmbeddingRequest =
            serde_json::from_value(json!({"input": ["a", "b"], "model": "bge-m3"})).unwrap();
        assert_eq!(
            batch.input.into_texts(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn encoding_format_defaults_to_float() {
        let req: EmbeddingRequest =
            serde_json::from_value(json!({"input": "x", "model": "m"})).unwrap();
        assert_eq!(req.encoding_format, EncodingFormat::Float);
        assert_eq!(req.dimensions, None);
    }

    #[test]
    fn upstream_response_tolerates_missing_usage() {
        let parsed: EmbeddingResponse = serde_json::from_value(json!({
            "data": [{"embedding": [0.1, 0.2], "index": 0}],
            "model": "m",
        }))
        .unwrap();
        assert_eq!(parsed.usage, Usage::default());
        assert_eq!(parsed.object, "list");
        assert_eq!(parsed.data[0].object, "embedding");
    }

    #[test]
    fn response_serializes_openai_shape() {
        let response = EmbeddingResponse::new(
            vec![EmbeddingData::new(vec![0.5], 0)],
            "bge-m3",
            Usage {
                prompt_tokens: 3,
                total_tokens: 3,
            },
        );
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["object"], "list");
        assert_eq!(value["data"][0]["object"], "embedding");
        assert_eq!(value["usage"]["prompt_tokens"], 3);
    }
}

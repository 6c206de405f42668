//! Configuration parsing and validation for the gateway binary.
//!
//! Every option can be supplied as a CLI flag or an environment variable.
//! An empty Docker image means the corresponding inference server is
//! managed outside the gateway and is proxied as-is (no model swapping).
use anyhow::anyhow;
use clap::Parser;
use url::Url;

#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The port on which the gateway will listen.
    #[arg(short = 'p', long, env = "GATEWAY_PORT", default_value_t = 8000)]
    pub port: u16,

    /// The port on which the metrics server will listen.
    #[arg(long, env = "GATEWAY_METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Whether to enable the metrics endpoint.
    #[arg(short = 'm', long, default_value_t = true)]
    pub metrics: bool,

    /// The prefix to use for metrics.
    #[arg(long, default_value = "embedding_gateway")]
    pub metrics_prefix: String,

    /// Base URL of the local Ollama server.
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub ollama_base_url: Url,

    /// Model identifiers pre-registered against Ollama (discovery adds the
    /// rest from its tag listing).
    #[arg(
        long,
        env = "OLLAMA_MODELS",
        value_delimiter = ',',
        default_value = "bge-m3,snowflake-arctic-embed2,qwen3-embedding:0.6b"
    )]
    pub ollama_models: Vec<String>,

    /// Base URL of the TEI server.
    #[arg(long, env = "TEI_BASE_URL", default_value = "http://localhost:8080")]
    pub tei_base_url: Url,

    /// Model reported for TEI when its introspection endpoint is down.
    #[arg(
        long,
        env = "TEI_DEFAULT_MODEL",
        default_value = "intfloat/multilingual-e5-large-instruct"
    )]
    pub tei_default_model: String,

    /// Models the TEI backend is allowed to load.
    #[arg(
        long,
        env = "TEI_MODELS",
        value_delimiter = ',',
        default_value = "intfloat/multilingual-e5-large-instruct"
    )]
    pub tei_models: Vec<String>,

    /// TEI container image. Empty: the server is proxied without swap
    /// management.
    #[arg(long, env = "TEI_DOCKER_IMAGE", default_value = "")]
    pub tei_docker_image: String,

    #[arg(long, env = "TEI_CONTAINER_NAME", default_value = "tei-embeddings")]
    pub tei_container_name: String,

    /// Host:container port publish for the TEI container.
    #[arg(long, env = "TEI_PUBLISH", default_value = "8080:80")]
    pub tei_publish: String,

    /// Model cache volume mounted into the TEI container.
    #[arg(long, env = "TEI_VOLUME", default_value = "tei-model-cache:/data")]
    pub tei_volume: String,

    #[arg(long, env = "TEI_SWAP_TIMEOUT_SECS", default_value_t = 600)]
    pub tei_swap_timeout_secs: u64,

    /// Base URL of the vLLM server (for models TEI cannot serve).
    #[arg(long, env = "VLLM_BASE_URL", default_value = "http://localhost:8081")]
    pub vllm_base_url: Url,

    /// Models the vLLM backend is allowed to load. Empty: vLLM disabled.
    #[arg(long, env = "VLLM_MODELS", value_delimiter = ',')]
    pub vllm_models: Vec<String>,

    /// vLLM container image. Empty: the server is proxied without swap
    /// management.
    #[arg(long, env = "VLLM_DOCKER_IMAGE", default_value = "")]
    pub vllm_docker_image: String,

    #[arg(long, env = "VLLM_CONTAINER_NAME", default_value = "vllm-embeddings")]
    pub vllm_container_name: String,

    #[arg(long, env = "VLLM_PUBLISH", default_value = "8081:8000")]
    pub vllm_publish: String,

    #[arg(long, env = "VLLM_SWAP_TIMEOUT_SECS", default_value_t = 300)]
    pub vllm_swap_timeout_secs: u64,

    /// Hugging Face token for gated models, passed into swapped containers.
    #[arg(long, env = "HF_TOKEN", default_value = "", hide_env_values = true)]
    pub hf_token: String,

    /// Timeout for embedding calls to any backend.
    #[arg(long, env = "BACKEND_TIMEOUT_SECS", default_value_t = 120)]
    pub backend_timeout_secs: u64,

    /// Timeout for a single health probe.
    #[arg(long, env = "HEALTH_TIMEOUT_SECS", default_value_t = 5)]
    pub health_timeout_secs: u64,

    /// Interval between health probes while waiting for a swapped
    /// container to come up.
    #[arg(long, default_value_t = 2)]
    pub swap_poll_interval_secs: u64,
}

impl Config {
    pub fn validate(self) -> Result<Self, anyhow::Error> {
        if !self.tei_docker_image.is_empty() && self.tei_models.is_empty() {
            return Err(anyhow!(
                "TEI swap management requires at least one entry in --tei-models"
            ));
        }
        if !self.vllm_docker_image.is_empty() && self.vllm_models.is_empty() {
            return Err(anyhow!(
                "vLLM swap management requires at least one entry in --vllm-models"
            ));
        }
        for publish in [&self.tei_publish, &self.vllm_publish] {
            if !publish.contains(':') {
                return Err(anyhow!(
                    "port publish '{publish}' must be in host:container form"
                ));
            }
        }
        Ok(self)
    }

    pub fn hf_token(&self) -> Option<String> {
        if self.hf_token.is_empty() {
            None
        } else {
            Some(self.hf_token.clone())
        }
    }
}

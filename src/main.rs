mod config;

use clap::Parser as _;
use config::Config;
use embedding_gateway::backend::process::DockerController;
use embedding_gateway::backend::{
    EmbeddingBackend, FixedBackend, OllamaBackend, SwappingBackend, SwappingConfig,
};
use embedding_gateway::client::create_hyper_client;
use embedding_gateway::registry::ModelRegistry;
use embedding_gateway::{AppState, build_metrics_layer_and_handle, build_metrics_router, build_router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use url::Url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse().validate()?;
    info!(port = config.port, "Starting embedding gateway");

    let registry = build_registry(&config).await;
    info!(models = ?registry.all_model_names(), "model registry initialized");

    let state = AppState::new(registry);
    let mut router = build_router(state.clone());

    if config.metrics {
        let (metrics_layer, metrics_handle) =
            build_metrics_layer_and_handle(config.metrics_prefix.clone());
        router = router.layer(metrics_layer);

        let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
        let metrics_listener = TcpListener::bind(&metrics_addr).await?;
        info!("Metrics listening on {}", metrics_addr);
        tokio::spawn(async move {
            if let Err(e) =
                axum::serve(metrics_listener, build_metrics_router(metrics_handle)).await
            {
                tracing::error!(error = %e, "metrics server failed");
            }
        });
    }

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Embedding gateway listening on {}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(registry) = state.registry() {
        registry.close_all().await;
    }

    Ok(())
}

/// Register the configured backends and their models, then run the one-shot
/// discovery pass. Traffic is only accepted once this returns.
async fn build_registry(config: &Config) -> ModelRegistry {
    let request_timeout = Duration::from_secs(config.backend_timeout_secs);
    let health_timeout = Duration::from_secs(config.health_timeout_secs);

    let mut registry = ModelRegistry::new();

    let ollama: Arc<dyn EmbeddingBackend> = Arc::new(OllamaBackend::new(
        config.ollama_base_url.clone(),
        create_hyper_client(),
        request_timeout,
        health_timeout,
    ));
    registry.register_backend("ollama", Arc::clone(&ollama));
    for model in &config.ollama_models {
        registry.register_model(model.as_str(), Arc::clone(&ollama));
    }

    let tei = inference_backend(
        config,
        &config.tei_base_url,
        &config.tei_docker_image,
        &config.tei_container_name,
        &config.tei_publish,
        Some(config.tei_volume.clone()),
        "--model-id",
        &config.tei_default_model,
        &config.tei_models,
        config.tei_swap_timeout_secs,
    )
    .await;
    registry.register_backend("tei", Arc::clone(&tei));
    for model in &config.tei_models {
        registry.register_model(model.as_str(), Arc::clone(&tei));
    }

    // vLLM covers the models TEI cannot serve; absent from the registry
    // entirely when no models are assigned to it.
    if !config.vllm_models.is_empty() {
        let default_model = &config.vllm_models[0];
        let vllm = inference_backend(
            config,
            &config.vllm_base_url,
            &config.vllm_docker_image,
            &config.vllm_container_name,
            &config.vllm_publish,
            None,
            "--model",
            default_model,
            &config.vllm_models,
            config.vllm_swap_timeout_secs,
        )
        .await;
        registry.register_backend("vllm", Arc::clone(&vllm));
        for model in &config.vllm_models {
            registry.register_model(model.as_str(), Arc::clone(&vllm));
        }
    }

    registry.discover_models().await;
    registry
}

/// An OpenAI-compatible inference server is either swap-managed (a Docker
/// image is configured) or proxied as-is.
#[allow(clippy::too_many_arguments)]
async fn inference_backend(
    config: &Config,
    base_url: &Url,
    docker_image: &str,
    container_name: &str,
    publish: &str,
    volume: Option<String>,
    model_flag: &str,
    default_model: &str,
    available_models: &[String],
    swap_timeout_secs: u64,
) -> Arc<dyn EmbeddingBackend> {
    let request_timeout = Duration::from_secs(config.backend_timeout_secs);
    let health_timeout = Duration::from_secs(config.health_timeout_secs);

    if docker_image.is_empty() {
        info!(url = %base_url, "proxying externally-managed inference server");
        return Arc::new(FixedBackend::new(
            base_url.clone(),
            default_model,
            create_hyper_client(),
            request_timeout,
            health_timeout,
        ));
    }

    let controller = DockerController::builder()
        .image(docker_image.to_string())
        .publish(publish.to_string())
        .maybe_volume(volume)
        .maybe_hf_token(config.hf_token())
        .model_flag(model_flag.to_string())
        .build();

    let swapping_config = SwappingConfig::builder()
        .base_url(base_url.clone())
        .container_name(container_name.to_string())
        .available_models(available_models.to_vec())
        .swap_timeout(Duration::from_secs(swap_timeout_secs))
        .poll_interval(Duration::from_secs(config.swap_poll_interval_secs))
        .request_timeout(request_timeout)
        .health_timeout(health_timeout)
        .build();

    let backend = Arc::new(SwappingBackend::new(
        swapping_config,
        create_hyper_client(),
        controller,
    ));
    backend.initialize().await;
    backend
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

//! External process control for swappable inference servers.
//!
//! A swapping backend changes models by restarting its inference container
//! with a different load target. That lifecycle lives behind
//! [`ProcessController`] so the swap state machine can be exercised in tests
//! without Docker.

use anyhow::anyhow;
use async_trait::async_trait;
use bon::Builder;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Stop/start interface for a named inference process.
#[async_trait]
pub trait ProcessController: Send + Sync {
    /// Stop and remove the named instance. "Already stopped" is a common
    /// benign failure; callers treat errors here as non-fatal.
    async fn stop(&self, name: &str) -> anyhow::Result<()>;

    /// Start a new named instance configured to load `model`.
    async fn start(&self, name: &str, model: &str) -> anyhow::Result<()>;
}

/// Docker CLI implementation of [`ProcessController`].
///
/// Stop is `docker rm -f <name>`; start is `docker run -d` with the image,
/// port publish, cache volume, optional GPU access and Hugging Face token,
/// and the model identifier passed through `model_flag`.
#[derive(Debug, Clone, Builder)]
pub struct DockerController {
    pub image: String,
    /// Host:container port publish, e.g. `8080:80`.
    pub publish: String,
    pub volume: Option<String>,
    #[builder(default = true)]
    pub gpus: bool,
    /// Token for gated models, injected as `HUGGING_FACE_HUB_TOKEN`.
    pub hf_token: Option<String>,
    /// CLI flag the image expects for its load target, e.g. `--model-id`
    /// (TEI) or `--model` (vLLM).
    #[builder(default = "--model-id".to_string())]
    pub model_flag: String,
    /// Arguments appended after the model flag.
    #[builder(default)]
    pub extra_args: Vec<String>,
    #[builder(default = Duration::from_secs(30))]
    pub command_timeout: Duration,
}

impl DockerController {
    fn run_args(&self, name: &str, model: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];
        if self.gpus {
            args.push("--gpus".to_string());
            args.push("all".to_string());
        }
        args.push("-p".to_string());
        args.push(self.publish.clone());
        if let Some(volume) = &self.volume {
            args.push("-v".to_string());
            args.push(volume.clone());
        }
        if let Some(token) = &self.hf_token {
            args.push("-e".to_string());
            args.push(format!("HUGGING_FACE_HUB_TOKEN={token}"));
        }
        args.push(self.image.clone());
        args.push(self.model_flag.clone());
        args.push(model.to_string());
        args.extend(self.extra_args.iter().cloned());
        args
    }

    async fn docker(&self, args: &[String]) -> anyhow::Result<Output> {
        debug!(command = %format!("docker {}", args.join(" ")), "running process-control command");

        let output = tokio::time::timeout(
            self.command_timeout,
            Command::new("docker").args(args).output(),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "docker {} timed out after {:?}",
                args.first().map(String::as_str).unwrap_or(""),
                self.command_timeout
            )
        })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "docker {} exited with {}: {}",
                args.first().map(String::as_str).unwrap_or(""),
                output.status,
                stderr.trim()
            ));
        }
        Ok(output)
    }
}

#[async_trait]
impl ProcessController for DockerController {
    async fn stop(&self, name: &str) -> anyhow::Result<()> {
        let args = vec!["rm".to_string(), "-f".to_string(), name.to_string()];
        match self.docker(&args).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(container = %name, error = %e, "container remove failed");
                Err(e)
            }
        }
    }

    async fn start(&self, name: &str, model: &str) -> anyhow::Result<()> {
        let args = self.run_args(name, model);
        self.docker(&args).await?;
        Ok(())
    }
}

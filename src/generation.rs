//! Text-to-image generation.
//!
//! `GenerationService::generate` makes exactly one remote call per request,
//! through a round-robin generation client, and persists the result in the
//! image cache. A semaphore caps the number of calls in flight across all
//! users.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::cache::ImageCache;
use crate::config::{Config, SharedConfig};
use crate::credentials::{CredentialRotator, ImageGenerationRequest, Purpose};
use crate::error::{PluginError, Result};
use crate::metrics::PluginMetrics;

pub struct GenerationService {
    config: SharedConfig,
    rotator: Arc<CredentialRotator>,
    cache: Arc<ImageCache>,
    limiter: Arc<Semaphore>,
}

impl GenerationService {
    /// Create the service; the concurrency cap is read from the current snapshot
    pub fn new(config: SharedConfig, rotator: Arc<CredentialRotator>, cache: Arc<ImageCache>) -> Self {
        let max_concurrent = config.load().max_concurrent.max(1);
        Self {
            config,
            rotator,
            cache,
            limiter: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Permits currently free in the concurrency limiter
    pub fn available_slots(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Generate one image and return its cached path
    ///
    /// # Arguments
    /// * `prompt` - User prompt; the persona prefix is prepended when enabled
    /// * `size` - `WIDTHxHEIGHT`; empty means the configured default
    ///
    /// # Errors
    /// - `Configuration` when no generation key is configured (before any network call)
    /// - `Auth` / `RateLimited` / `Api` for non-success responses
    /// - `Timeout` when the call exceeds `generation_timeout`
    /// - `NoImageData` when the response carries neither URL nor base64
    pub async fn generate(&self, prompt: &str, size: &str) -> Result<PathBuf> {
        let config = self.config.load_full();
        let prompt = apply_persona(&config, prompt);

        let _slot = self
            .limiter
            .acquire()
            .await
            .map_err(|_| PluginError::Configuration("Generation limiter closed".to_string()))?;

        let (client, _key) = self.rotator.get_client(Purpose::Generation)?;
        let request = build_request(&config, prompt, size);
        let timeout = config.generation_timeout();

        tracing::info!(
            model = %request.model,
            size = request.size.as_deref().unwrap_or(""),
            prompt = %truncate(&request.prompt, 50),
            "Starting image generation"
        );

        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, client.generate_image(&request)).await {
            Ok(result) => result,
            Err(_) => Err(PluginError::Timeout {
                operation: "generation",
                after: timeout,
            }),
        };
        PluginMetrics::global().record_generation(outcome.is_ok(), started.elapsed().as_secs_f64());

        let response = outcome.map_err(|e| {
            tracing::error!(error = %e, "Image generation call failed");
            e
        })?;

        let image = response.data.into_iter().next().ok_or(PluginError::NoImageData)?;
        let path = if let Some(url) = image.url.filter(|u| !u.is_empty()) {
            self.cache.download(&url).await?
        } else if let Some(b64) = image.b64_json.filter(|b| !b.is_empty()) {
            self.cache.save_base64(&b64).await?
        } else {
            return Err(PluginError::NoImageData);
        };

        tracing::info!(
            file = %path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Image generation completed"
        );
        Ok(path)
    }
}

fn apply_persona(config: &Config, prompt: &str) -> String {
    let prefix = config.persona_prefix.trim();
    if config.auto_inject_persona && !prefix.is_empty() {
        format!("{} {}", prefix, prompt)
    } else {
        prompt.to_string()
    }
}

fn build_request(config: &Config, prompt: String, size: &str) -> ImageGenerationRequest {
    let size = if size.trim().is_empty() {
        config.size.clone()
    } else {
        size.trim().to_string()
    };
    ImageGenerationRequest {
        prompt,
        model: config.model.clone(),
        size: Some(size).filter(|s| !s.is_empty()),
        num_inference_steps: config.num_inference_steps,
        negative_prompt: config.negative_prompt().map(str::to_string),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

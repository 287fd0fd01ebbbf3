//! Host-facing plugin facade.
//!
//! `ImagePlugin` owns one instance of every component and exposes the
//! handlers a host wires to its events:
//!
//! | Handler        | Trigger                          | Result                    |
//! |----------------|----------------------------------|---------------------------|
//! | `draw_tool`    | LLM tool call `(prompt, outfit)` | image via sink + tool text |
//! | `cmd_aiimg`    | `/aiimg <prompt> [ratio]`        | image or error text       |
//! | `cmd_aiedit`   | `/aiedit <prompt> [task-types]`  | ack now, image via sink   |
//! | `cmd_clean`    | `/aiimg_clean`                   | before/after summary      |
//! | `cmd_stats`    | `/aiimg_stats`                   | cache and limits summary  |
//!
//! Rejections and failures never escape as errors; they are rendered as text
//! for the user.

pub mod commands;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::admission::{edit_key, message_id_or_fallback, AdmissionController, Rejection};
use crate::cache::{ImageCache, SweepReport};
use crate::config::SharedConfig;
use crate::constants::SHUTDOWN_GRACE;
use crate::credentials::CredentialRotator;
use crate::edit::{EditOrchestrator, TaskRegistry};
use crate::error::{PluginError, Result};
use crate::generation::GenerationService;
use crate::host::{InboundMessage, Reply, ReplySink, UrlDownloader};
use crate::outfit::{self, OutfitProvider, ScheduleOutfitProvider};

pub struct ImagePlugin {
    config: SharedConfig,
    admission: Arc<AdmissionController>,
    rotator: Arc<CredentialRotator>,
    cache: Arc<ImageCache>,
    generation: Arc<GenerationService>,
    editor: Arc<EditOrchestrator>,
    tasks: TaskRegistry,
    outfit: Option<Arc<dyn OutfitProvider>>,
    downloader: Option<Arc<dyn UrlDownloader>>,
}

impl ImagePlugin {
    /// Build every component from the current configuration snapshot
    ///
    /// Background loops are not started; call `start()` from inside a Tokio
    /// runtime.
    pub fn new(config: SharedConfig) -> Result<Self> {
        let snapshot = config.load_full();
        snapshot.validate().map_err(PluginError::Configuration)?;

        let rotator = Arc::new(CredentialRotator::new(config.clone())?);
        let cache = Arc::new(ImageCache::new(snapshot.image_dir(), config.clone())?);
        let generation = Arc::new(GenerationService::new(
            config.clone(),
            Arc::clone(&rotator),
            Arc::clone(&cache),
        ));
        let editor = Arc::new(EditOrchestrator::new(Arc::clone(&rotator), Arc::clone(&cache)));
        let admission = Arc::new(AdmissionController::new(
            snapshot.debounce_interval(),
            snapshot.completion_cooldown(),
        ));
        let outfit = snapshot
            .outfit_schedule_file
            .as_ref()
            .map(|path| Arc::new(ScheduleOutfitProvider::new(path)) as Arc<dyn OutfitProvider>);

        tracing::info!(
            image_dir = %cache.dir().display(),
            max_concurrent = snapshot.max_concurrent,
            outfit_source = outfit.is_some(),
            "Image plugin initialised"
        );

        Ok(Self {
            config,
            admission,
            rotator,
            cache,
            generation,
            editor,
            tasks: TaskRegistry::new(),
            outfit,
            downloader: None,
        })
    }

    /// Replace the outfit source
    pub fn with_outfit_provider(mut self, provider: Arc<dyn OutfitProvider>) -> Self {
        self.outfit = Some(provider);
        self
    }

    /// Use the host's download helper for image URLs
    pub fn with_downloader(mut self, downloader: Arc<dyn UrlDownloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Override the edit poll cadence
    pub fn with_edit_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.editor = Arc::new(EditOrchestrator::with_polling(
            Arc::clone(&self.rotator),
            Arc::clone(&self.cache),
            interval,
            max_attempts,
        ));
        self
    }

    /// Start the cache sweep (when enabled) and the admission maintenance loop
    pub fn start(&self) {
        if self.config.load().cache_cleanup_enabled {
            self.cache.start_sweep_task(None);
        }
        self.admission.start_maintenance_task(None);
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// LLM tool: draw an image from a natural-language prompt
    ///
    /// The image is delivered through `sink`; the returned text is meant for
    /// the calling model.
    pub async fn draw_tool(
        &self,
        message: &InboundMessage,
        prompt: &str,
        include_outfit: bool,
        sink: &dyn ReplySink,
    ) -> String {
        let user_id = message.sender_id.as_str();
        let message_id = message_id_or_fallback(message.message_id.as_deref(), user_id, &message.text);

        let permit = match self.admission.admit(user_id, &message_id) {
            Ok(permit) => permit,
            Err(rejection) => return tool_rejection_text(rejection).to_string(),
        };

        let prompt = if include_outfit {
            self.enrich_with_outfit(prompt).await
        } else {
            prompt.to_string()
        };

        match self.generation.generate(&prompt, "").await {
            Ok(path) => {
                if let Err(e) = sink.send(Reply::Image(path)).await {
                    tracing::error!(user_id = %user_id, error = %e, "Failed to deliver generated image");
                    // The image exists; keep the message marked as handled
                    permit.succeed();
                    return format!("The image was generated but could not be sent: {}", e);
                }
                permit.succeed();
                "The image was generated and sent. Reply to the user naturally in text and do not call the tool again.".to_string()
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Draw tool generation failed");
                permit.fail();
                format!(
                    "Generation failed: {}. Tell the user to try again later.",
                    e.user_message()
                )
            }
        }
    }

    async fn enrich_with_outfit(&self, prompt: &str) -> String {
        let provider = match &self.outfit {
            Some(provider) => provider,
            None => return prompt.to_string(),
        };
        let outfit = match provider.today_outfit().await {
            Some(outfit) => outfit,
            None => return prompt.to_string(),
        };

        let config = self.config.load_full();
        let outfit = if config.smart_outfit_filter {
            outfit::smart_filter(&self.rotator, &config.text_model, &outfit, prompt).await
        } else {
            outfit
        };
        outfit::with_outfit(&outfit, prompt)
    }

    /// `/aiimg <prompt> [ratio]`
    pub async fn cmd_aiimg(&self, message: &InboundMessage, args: &str) -> Vec<Reply> {
        let (prompt, ratio) = commands::split_ratio(args);
        if prompt.is_empty() {
            return vec![Reply::text("Please provide a prompt. Usage: /aiimg <prompt> [ratio]")];
        }

        let user_id = message.sender_id.as_str();
        let message_id = message_id_or_fallback(message.message_id.as_deref(), user_id, &message.text);
        let permit = match self.admission.admit(user_id, &message_id) {
            Ok(permit) => permit,
            Err(rejection) => return vec![Reply::text(rejection.user_message())],
        };

        let size = commands::resolve_size(&self.config.load().size, ratio);
        match self.generation.generate(prompt, &size).await {
            Ok(path) => {
                permit.succeed();
                vec![Reply::Image(path)]
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Command generation failed");
                permit.fail();
                vec![Reply::text(format!("Generation failed: {}", e.user_message()))]
            }
        }
    }

    /// `/aiedit <prompt> [task-types]`
    ///
    /// Returns an acknowledgement immediately; the edit runs as a detached
    /// task and reports through `sink`.
    pub async fn cmd_aiedit(
        &self,
        message: &InboundMessage,
        args: &str,
        sink: Arc<dyn ReplySink>,
    ) -> Vec<Reply> {
        let (prompt, task_types) = commands::split_task_types(args);
        if prompt.is_empty() {
            return vec![Reply::text(
                "Please provide an edit prompt. Usage: /aiedit <prompt> [task-types]",
            )];
        }

        let user_id = message.sender_id.as_str();
        let message_id = message_id_or_fallback(message.message_id.as_deref(), user_id, &message.text);
        let permit = match self.admission.admit(&edit_key(user_id), &message_id) {
            Ok(permit) => permit,
            Err(rejection) => return vec![Reply::text(rejection.user_message())],
        };

        let images = self
            .cache
            .extract_images_from_trigger(message, self.downloader.as_deref())
            .await;
        if images.is_empty() {
            permit.fail();
            return vec![Reply::text(
                "Please attach an image or reply to a message with an image",
            )];
        }

        let image_count = images.len();
        let editor = Arc::clone(&self.editor);
        let prompt = prompt.to_string();
        let user = user_id.to_string();
        self.tasks.spawn("edit", async move {
            match editor.edit(&prompt, images, &task_types).await {
                Ok(path) => {
                    if let Err(e) = sink.send(Reply::Image(path)).await {
                        tracing::error!(user_id = %user, error = %e, "Failed to deliver edited image");
                    }
                    permit.succeed();
                }
                Err(e) => {
                    tracing::error!(user_id = %user, error = %e, "Image edit failed");
                    let text = format!("Edit failed: {}", e.user_message());
                    if let Err(send_err) = sink.send(Reply::Text(text)).await {
                        tracing::error!(user_id = %user, error = %send_err, "Failed to deliver edit error");
                    }
                    permit.fail();
                }
            }
        });

        vec![Reply::text(format!(
            "Editing {} image(s), this can take a few minutes...",
            image_count
        ))]
    }

    /// `/aiimg_clean`: delete every cached image
    pub async fn cmd_clean(&self) -> Vec<Reply> {
        let before = match self.cache.stats().await {
            Ok(stats) => stats,
            Err(e) => return vec![Reply::text(format!("Failed to read cache: {}", e))],
        };
        if before.is_empty() {
            return vec![Reply::text("Cache is empty, nothing to clean")];
        }

        let mut replies = vec![Reply::text(format!(
            "Cleaning...\nCurrent: {} images, {:.2} MB",
            before.count,
            before.size_mb()
        ))];

        match self.cache.wipe_all().await {
            Ok((deleted, freed)) if deleted > 0 => {
                let freed_mb = freed as f64 / (1024.0 * 1024.0);
                tracing::info!(deleted = deleted, freed_bytes = freed, "Manual cache clean");
                replies.push(Reply::text(format!(
                    "Clean complete\nDeleted: {} images\nFreed: {:.2} MB",
                    deleted, freed_mb
                )));
            }
            Ok(_) => replies.push(Reply::text("No files were deleted")),
            Err(e) => replies.push(Reply::text(format!("Clean failed: {}", e))),
        }
        replies
    }

    /// `/aiimg_stats`: cache statistics and active limits
    pub async fn cmd_stats(&self) -> Vec<Reply> {
        let stats = match self.cache.stats().await {
            Ok(stats) => stats,
            Err(e) => return vec![Reply::text(format!("Failed to read cache: {}", e))],
        };
        let config = self.config.load();
        let cleanup = if config.cache_cleanup_enabled {
            "enabled"
        } else {
            "disabled"
        };

        let lines = [
            "Image cache statistics".to_string(),
            "----------------".to_string(),
            format!("Cached images: {}", stats.count),
            format!("Disk usage: {:.2} MB", stats.size_mb()),
            format!("Oldest file: {:.1} hours ago", stats.oldest_hours()),
            "----------------".to_string(),
            format!("Auto cleanup: {}", cleanup),
            format!("Retention: {} hours", config.cache_max_age_hours),
            format!("Count limit: {} images", config.cache_max_count),
            format!("Concurrency limit: {}", config.max_concurrent),
            format!("Generation timeout: {} s", config.generation_timeout),
        ];
        vec![Reply::Text(lines.join("\n"))]
    }

    /// Run one sweep now
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        self.cache.sweep().await
    }

    /// Generate without admission, for one-shot CLI use
    pub async fn generate_direct(&self, prompt: &str, ratio: Option<&str>) -> Result<PathBuf> {
        let size = match ratio {
            Some(ratio) => commands::resolve_size(&self.config.load().size, ratio),
            None => String::new(),
        };
        self.generation.generate(prompt, &size).await
    }

    /// Edit without admission, for one-shot CLI use
    pub async fn edit_direct(
        &self,
        prompt: &str,
        images: Vec<Vec<u8>>,
        task_types: &[String],
    ) -> Result<PathBuf> {
        self.editor.edit(prompt, images, task_types).await
    }

    /// Stop background loops, cancel detached edits and release clients
    pub async fn terminate(&self) {
        tracing::info!("Shutting down image plugin");
        self.cache.close();
        self.admission.stop_maintenance_task();

        let cancelled = self.tasks.shutdown(SHUTDOWN_GRACE).await;
        if cancelled > 0 {
            tracing::info!(cancelled = cancelled, "Cancelled detached edit tasks");
        }

        self.rotator.close();
        self.admission.clear_debounce();
        tracing::info!("Image plugin stopped");
    }
}

fn tool_rejection_text(rejection: Rejection) -> &'static str {
    match rejection {
        Rejection::AlreadyHandled => {
            "The image was already generated and sent. Reply to the user in text."
        }
        Rejection::TooFrequent => "Too many requests, please try again later.",
        Rejection::InProgress => "The image is still being generated, please wait.",
    }
}

//! Asynchronous image editing.
//!
//! An edit is a remote task: submit a multipart request, then poll its status
//! until it reaches a terminal state or the attempt ceiling.
//!
//! ```text
//! submitted -> polling -> succeeded
//!                      -> failed | cancelled
//!                      -> timed_out
//! ```
//!
//! No step is retried. Transport errors end the edit immediately.

pub mod registry;
pub mod task;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};

use crate::cache::ImageCache;
use crate::constants::{
    EDIT_GUIDANCE_SCALE, EDIT_INFERENCE_STEPS, EDIT_MAX_POLL_ATTEMPTS, EDIT_MODEL,
    EDIT_POLL_INTERVAL,
};
use crate::credentials::{ApiClient, CredentialRotator, Purpose};
use crate::error::{PluginError, Result};
use crate::metrics::PluginMetrics;

pub use registry::TaskRegistry;
pub use task::{RemoteStatus, TaskStatusResponse};

pub struct EditOrchestrator {
    rotator: Arc<CredentialRotator>,
    cache: Arc<ImageCache>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl EditOrchestrator {
    /// Orchestrator with the default 5s poll interval and 60 attempts
    pub fn new(rotator: Arc<CredentialRotator>, cache: Arc<ImageCache>) -> Self {
        Self::with_polling(rotator, cache, EDIT_POLL_INTERVAL, EDIT_MAX_POLL_ATTEMPTS)
    }

    pub fn with_polling(
        rotator: Arc<CredentialRotator>,
        cache: Arc<ImageCache>,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            rotator,
            cache,
            poll_interval,
            max_attempts,
        }
    }

    /// Run one edit to completion and return the cached result path
    ///
    /// # Arguments
    /// * `prompt` - Edit instruction
    /// * `images` - Input images, sent in order as `img_0.jpg`, `img_1.jpg`, ...
    /// * `task_types` - Edit task types sent as repeated form fields
    ///
    /// # Errors
    /// - `Configuration` when no edit key is configured
    /// - `Submission` when the task is refused
    /// - `TaskFailed` when the task ends `failed` or `cancelled`
    /// - `Timeout` when the attempt ceiling is reached
    pub async fn edit(
        &self,
        prompt: &str,
        images: Vec<Vec<u8>>,
        task_types: &[String],
    ) -> Result<PathBuf> {
        let (client, _key) = self.rotator.get_client(Purpose::Edit)?;
        let result = self.run(&client, prompt, images, task_types).await;

        let label = match &result {
            Ok(_) => "success",
            Err(PluginError::TaskFailed { .. }) => "failed",
            Err(PluginError::Timeout { .. }) => "timeout",
            Err(_) => "error",
        };
        PluginMetrics::global().record_edit(label);
        result
    }

    async fn run(
        &self,
        client: &ApiClient,
        prompt: &str,
        images: Vec<Vec<u8>>,
        task_types: &[String],
    ) -> Result<PathBuf> {
        let image_count = images.len();
        let task_id = self.submit(client, prompt, images, task_types).await?;
        tracing::info!(
            task_id = %task_id,
            images = image_count,
            task_types = ?task_types,
            "Edit task submitted"
        );

        let file_url = self.poll(client, &task_id).await?;
        let path = self.cache.download(&file_url).await?;
        tracing::info!(task_id = %task_id, file = %path.display(), "Edit task completed");
        Ok(path)
    }

    async fn submit(
        &self,
        client: &ApiClient,
        prompt: &str,
        images: Vec<Vec<u8>>,
        task_types: &[String],
    ) -> Result<String> {
        let mut form = Form::new()
            .text("prompt", prompt.to_string())
            .text("model", EDIT_MODEL)
            .text("num_inference_steps", EDIT_INFERENCE_STEPS)
            .text("guidance_scale", EDIT_GUIDANCE_SCALE);
        for task_type in task_types {
            form = form.text("task_types", task_type.clone());
        }
        for (idx, data) in images.into_iter().enumerate() {
            let part = Part::bytes(data)
                .file_name(format!("img_{}.jpg", idx))
                .mime_str("image/jpeg")
                .map_err(|e| PluginError::Submission(format!("Invalid image part: {}", e)))?;
            form = form.part("image", part);
        }

        let response = client
            .http()
            .post(client.endpoint("async/images/edits"))
            .bearer_auth(client.api_key())
            .header("X-Failover-Enabled", "true")
            .timeout(client.timeout())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PluginError::Submission(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: task::SubmitResponse = serde_json::from_str(&body)
            .map_err(|e| PluginError::Submission(format!("Unreadable submit response: {}", e)))?;
        parsed
            .task_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PluginError::Submission(format!("No task_id in response: {}", body)))
    }

    /// Poll until a terminal status; returns the output file URL on success
    async fn poll(&self, client: &ApiClient, task_id: &str) -> Result<String> {
        let url = client.endpoint(&format!("task/{}", task_id));

        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.poll_interval).await;

            let response = client
                .http()
                .get(&url)
                .bearer_auth(client.api_key())
                .header("X-Failover-Enabled", "true")
                .timeout(client.timeout())
                .send()
                .await?;

            let http_status = response.status();
            if !http_status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(PluginError::from_status(http_status.as_u16(), body));
            }

            let status: TaskStatusResponse = response.json().await.map_err(|e| {
                PluginError::InvalidResponse(format!("Failed to parse task status: {}", e))
            })?;

            match status.status {
                RemoteStatus::Success => {
                    return status.file_url().map(str::to_string).ok_or_else(|| {
                        PluginError::InvalidResponse(format!(
                            "Task {} succeeded without output.file_url",
                            task_id
                        ))
                    });
                }
                RemoteStatus::Failed | RemoteStatus::Cancelled => {
                    tracing::warn!(
                        task_id = %task_id,
                        status = status.status.as_str(),
                        error = %status.error_detail(),
                        "Edit task ended without output"
                    );
                    return Err(PluginError::TaskFailed {
                        status: status.status.as_str().to_string(),
                        detail: status.error_detail(),
                    });
                }
                RemoteStatus::Pending => {
                    tracing::debug!(task_id = %task_id, attempt = attempt, "Edit task still running");
                }
            }
        }

        Err(PluginError::Timeout {
            operation: "edit task",
            after: self.poll_interval * self.max_attempts,
        })
    }
}

//! Local image cache.
//!
//! `ImageCache` owns one directory of generated and downloaded images. It
//! writes files atomically (temp file, then rename), resolves host image
//! references, and keeps the directory bounded with a background sweep.
//!
//! # Layout
//!
//! ```text
//! <data_dir>/images/
//!   1700000000_1a2b3c4d.jpg
//!   1700000042_deadbeef.jpg
//! ```
//!
//! Only files with a recognised image extension are considered; anything
//! else in the directory (including in-progress `.tmp` files) is ignored.

pub mod extract;
pub mod naming;
pub mod stats;
pub mod sweep;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::oneshot;

use crate::config::SharedConfig;
use crate::constants::{CACHE_SWEEP_GRACE, DEFAULT_IMAGE_EXTENSION};
use crate::error::{PluginError, Result};
use crate::metrics::PluginMetrics;

pub use stats::CacheStats;
pub use sweep::{plan_sweep, FileRecord, SweepPlan, SweepPolicy, SweepReport};

/// Bounded directory of image files
pub struct ImageCache {
    dir: PathBuf,
    config: SharedConfig,
    http: reqwest::Client,
    sweep_shutdown: RwLock<Option<oneshot::Sender<()>>>,
}

impl ImageCache {
    /// Create a cache over `dir`, creating the directory if needed
    ///
    /// # Errors
    /// Returns `PluginError::Io` if the directory cannot be created and
    /// `PluginError::Configuration` if the HTTP client cannot be built.
    pub fn new(dir: impl Into<PathBuf>, config: SharedConfig) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PluginError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            dir,
            config,
            http,
            sweep_shutdown: RwLock::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn new_path(&self) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.dir
            .join(naming::unique_file_name(now, DEFAULT_IMAGE_EXTENSION))
    }

    /// Persist `data` under a new unique name
    pub async fn save_bytes(&self, data: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.new_path();
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, data).await?;
        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!(file = %path.display(), bytes = data.len(), "Saved image");
        Ok(path)
    }

    /// Decode a base64 payload and persist it
    ///
    /// # Errors
    /// `PluginError::Decode` when the payload is not valid base64.
    pub async fn save_base64(&self, b64: &str) -> Result<PathBuf> {
        let data = decode_base64(b64)?;
        self.save_bytes(&data).await
    }

    /// Fetch `url` and return the body of a 200 response
    pub async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Bytes> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| PluginError::Download(format!("HTTP fetch failed: {}", e)))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(PluginError::Download(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| PluginError::Download(format!("Failed to read HTTP body: {}", e)))
    }

    /// Download `url` into the cache
    pub async fn download(&self, url: &str) -> Result<PathBuf> {
        let timeout = self.config.load().http_timeout();
        let data = self.fetch_bytes(url, timeout).await?;
        self.save_bytes(&data).await
    }

    /// Read a cached image back
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    /// Run one sweep with the limits from the current configuration
    pub async fn sweep(&self) -> Result<SweepReport> {
        let dir = self.dir.clone();
        let policy = SweepPolicy::from_config(&self.config.load());

        let report = tokio::task::spawn_blocking(move || -> std::io::Result<SweepReport> {
            let records = sweep::scan_dir(&dir, SystemTime::now())?;
            let total = records.len();
            let plan = plan_sweep(records, &policy);
            Ok(sweep::execute_plan(&plan, total))
        })
        .await
        .map_err(|e| PluginError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        PluginMetrics::global().record_sweep(report.deleted, report.freed_bytes);
        if report.deleted > 0 {
            tracing::info!(
                deleted = report.deleted,
                remaining = report.remaining,
                freed_bytes = report.freed_bytes,
                "Cache sweep completed"
            );
        }
        Ok(report)
    }

    /// Count, size and oldest age of the cached images
    pub async fn stats(&self) -> Result<CacheStats> {
        let dir = self.dir.clone();
        let stats = tokio::task::spawn_blocking(move || -> std::io::Result<CacheStats> {
            let records = sweep::scan_dir(&dir, SystemTime::now())?;
            Ok(CacheStats::from_records(&records))
        })
        .await
        .map_err(|e| PluginError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        Ok(stats)
    }

    /// Delete every cached image regardless of age
    ///
    /// Returns `(deleted, freed_bytes)`.
    pub async fn wipe_all(&self) -> Result<(usize, u64)> {
        let dir = self.dir.clone();
        let (deleted, freed) = tokio::task::spawn_blocking(move || -> std::io::Result<(usize, u64)> {
            let records = sweep::scan_dir(&dir, SystemTime::now())?;
            let mut deleted = 0;
            let mut freed = 0;
            for record in records {
                match std::fs::remove_file(&record.path) {
                    Ok(()) => {
                        deleted += 1;
                        freed += record.size;
                    }
                    Err(e) => tracing::warn!(
                        file = %record.path.display(),
                        error = %e,
                        "Failed to delete cached image"
                    ),
                }
            }
            Ok((deleted, freed))
        })
        .await
        .map_err(|e| PluginError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        PluginMetrics::global().record_sweep(deleted, freed);
        tracing::info!(deleted = deleted, freed_bytes = freed, "Cache wiped");
        Ok((deleted, freed))
    }

    /// Start the background sweep loop
    ///
    /// The first sweep runs after `grace` (default 10s), then one per
    /// configured cleanup interval. The interval is re-read from the live
    /// configuration before every wait. A second call while the loop is
    /// running is a no-op.
    pub fn start_sweep_task(self: &Arc<Self>, grace: Option<Duration>) {
        let grace = grace.unwrap_or(CACHE_SWEEP_GRACE);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        {
            let mut guard = self.sweep_shutdown.write();
            if guard.is_some() {
                tracing::debug!("Cache sweep task already running, skipping duplicate start");
                return;
            }
            *guard = Some(shutdown_tx);
        }

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(grace) => {}
                _ = &mut shutdown_rx => {
                    tracing::debug!("Cache sweep task shutting down");
                    return;
                }
            }

            loop {
                if let Err(e) = cache.sweep().await {
                    tracing::error!(error = %e, "Cache sweep failed");
                }

                let interval = cache.config.load().cleanup_interval();
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Cache sweep task shutting down");
                        break;
                    }
                }
            }
        });
        tracing::info!(dir = %self.dir.display(), "Cache sweep task started");
    }

    /// Stop the background sweep loop if it is running
    pub fn stop_sweep_task(&self) {
        if let Some(shutdown_tx) = self.sweep_shutdown.write().take() {
            let _ = shutdown_tx.send(());
        }
    }

    pub fn is_sweep_running(&self) -> bool {
        self.sweep_shutdown.read().is_some()
    }

    /// Stop background work
    pub fn close(&self) {
        self.stop_sweep_task();
    }
}

/// Decode standard base64, tolerating a `base64://` prefix and embedded whitespace
pub fn decode_base64(b64: &str) -> Result<Vec<u8>> {
    let payload = b64.trim();
    let payload = payload.strip_prefix("base64://").unwrap_or(payload);
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| PluginError::Decode(e.to_string()))
}

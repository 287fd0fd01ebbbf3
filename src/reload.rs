// Configuration hot reload module
// Handles SIGHUP signal to reload configuration without restarting the host

use crate::config::{Config, SharedConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// ReloadManager handles configuration reload via SIGHUP signal
pub struct ReloadManager {
    config_path: PathBuf,
    shared: SharedConfig,
    reload_requested: Arc<AtomicBool>,
    generation: AtomicU64,
}

impl ReloadManager {
    /// Create a new ReloadManager for the config file backing `shared`
    pub fn new(config_path: PathBuf, shared: SharedConfig) -> Self {
        Self {
            config_path,
            shared,
            reload_requested: Arc::new(AtomicBool::new(false)),
            generation: AtomicU64::new(0),
        }
    }

    /// Register SIGHUP signal handler
    /// Sets the reload flag; the watch task picks it up
    #[cfg(unix)]
    pub fn register_signal_handler(&self) -> Result<(), String> {
        use signal_hook::consts::SIGHUP;
        use signal_hook::flag;

        flag::register(SIGHUP, Arc::clone(&self.reload_requested))
            .map_err(|e| format!("Failed to register SIGHUP handler: {}", e))?;

        Ok(())
    }

    /// Check if reload was requested via SIGHUP
    pub fn is_reload_requested(&self) -> bool {
        self.reload_requested.load(Ordering::Relaxed)
    }

    /// Clear the reload request flag
    pub fn clear_reload_request(&self) {
        self.reload_requested.store(false, Ordering::Relaxed);
    }

    /// Attempt to reload configuration from file
    /// Returns Ok(new_config) if reload successful, Err if validation fails
    pub fn reload_config(&self) -> Result<Config, String> {
        let new_config = Config::from_file(&self.config_path)?;
        new_config.validate()?;
        Ok(new_config)
    }

    /// Reload, validate and publish a new snapshot
    ///
    /// On failure the current snapshot stays in place.
    pub fn apply_reload(&self) -> Result<u64, String> {
        let new_config = self.reload_config()?;
        self.shared.store(Arc::new(new_config));
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            config_file = %self.config_path.display(),
            generation = generation,
            "Configuration reloaded"
        );
        Ok(generation)
    }

    /// Number of successful reloads so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Get the config file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Poll the SIGHUP flag and apply reloads until `shutdown` fires
    pub fn spawn_watch_task(
        self: Arc<Self>,
        poll_interval: Duration,
        mut shutdown: oneshot::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if self.is_reload_requested() {
                            self.clear_reload_request();
                            if let Err(e) = self.apply_reload() {
                                tracing::error!(error = %e, "Configuration reload failed, keeping current config");
                            }
                        }
                    }
                    _ = &mut shutdown => {
                        tracing::debug!("Config reload watcher shutting down");
                        break;
                    }
                }
            }
        })
    }
}

//! Credential rotation
//!
//! Two key pools, one per [`Purpose`]. Each call to `get_client` takes the
//! next key in strict round-robin order and returns a cached [`ApiClient`]
//! for it. Keys are never skipped for health reasons.
//!
//! Pools are filled from the live configuration snapshot. An empty pool is
//! refilled on the next call, so keys added through a config reload are
//! picked up without restarting.

pub mod client;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{Config, SharedConfig};
use crate::constants::GENERATION_CLIENT_SLACK_SECS;
use crate::error::{PluginError, Result};

pub use client::{ApiClient, ChatCompletionRequest, ChatMessage, ImageGenerationRequest};

/// Which key pool a client is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Generation,
    Edit,
}

impl Purpose {
    fn keys(&self, config: &Config) -> Vec<String> {
        match self {
            Purpose::Generation => config.generation_keys(),
            Purpose::Edit => config.edit_keys(),
        }
    }

    fn base_url<'a>(&self, config: &'a Config) -> &'a str {
        match self {
            Purpose::Generation => &config.base_url,
            Purpose::Edit => config.edit_base_url(),
        }
    }

    fn timeout(&self, config: &Config) -> Duration {
        match self {
            Purpose::Generation => {
                config.generation_timeout() + Duration::from_secs(GENERATION_CLIENT_SLACK_SECS)
            }
            Purpose::Edit => config.http_timeout(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Purpose::Generation => "generation",
            Purpose::Edit => "edit",
        }
    }
}

#[derive(Debug, Default)]
struct KeyPool {
    keys: Vec<String>,
    cursor: usize,
}

impl KeyPool {
    fn next_key(&mut self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        let key = self.keys[self.cursor % self.keys.len()].clone();
        self.cursor = (self.cursor + 1) % self.keys.len();
        Some(key)
    }

    fn refill(&mut self, keys: Vec<String>) {
        self.keys = keys;
        self.cursor = 0;
    }
}

#[derive(Debug, Default)]
struct RotatorState {
    generation: KeyPool,
    edit: KeyPool,
    clients: HashMap<(Purpose, String), Arc<ApiClient>>,
}

impl RotatorState {
    fn pool_mut(&mut self, purpose: Purpose) -> &mut KeyPool {
        match purpose {
            Purpose::Generation => &mut self.generation,
            Purpose::Edit => &mut self.edit,
        }
    }
}

/// Round-robin key selection with lazily built, reused client handles
pub struct CredentialRotator {
    config: SharedConfig,
    http: reqwest::Client,
    state: Mutex<RotatorState>,
}

impl CredentialRotator {
    /// Create a rotator over the live configuration
    ///
    /// Pools are filled from the current snapshot immediately.
    pub fn new(config: SharedConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PluginError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        let snapshot = config.load();
        let mut state = RotatorState::default();
        state.generation.refill(Purpose::Generation.keys(&snapshot));
        state.edit.refill(Purpose::Edit.keys(&snapshot));
        tracing::debug!(
            generation_keys = state.generation.keys.len(),
            edit_keys = state.edit.keys.len(),
            "Credential pools initialised"
        );

        Ok(Self {
            config,
            http,
            state: Mutex::new(state),
        })
    }

    /// Next client for `purpose`, together with the key it is bound to
    ///
    /// # Errors
    /// `PluginError::Configuration` when the pool is still empty after
    /// re-reading the current configuration.
    pub fn get_client(&self, purpose: Purpose) -> Result<(Arc<ApiClient>, String)> {
        let snapshot = self.config.load();
        let mut state = self.state.lock();

        let pool = state.pool_mut(purpose);
        if pool.keys.is_empty() {
            pool.refill(purpose.keys(&snapshot));
            if !pool.keys.is_empty() {
                tracing::info!(
                    purpose = purpose.as_str(),
                    keys = pool.keys.len(),
                    "Reloaded API keys from configuration"
                );
            }
        }
        let key = pool.next_key().ok_or_else(|| {
            PluginError::Configuration(format!("No {} API key configured", purpose.as_str()))
        })?;

        let base_url = purpose.base_url(&snapshot);
        let timeout = purpose.timeout(&snapshot);
        let cache_key = (purpose, key.clone());

        // Rebuild the handle if the endpoint or timeout changed under a reload
        let reusable = state.clients.get(&cache_key).filter(|client| {
            client.base_url() == base_url.trim_end_matches('/') && client.timeout() == timeout
        });
        let client = match reusable {
            Some(client) => Arc::clone(client),
            None => {
                let client = Arc::new(ApiClient::new(
                    self.http.clone(),
                    base_url,
                    key.clone(),
                    timeout,
                ));
                state.clients.insert(cache_key, Arc::clone(&client));
                client
            }
        };

        Ok((client, key))
    }

    /// Number of cached client handles
    pub fn cached_clients(&self) -> usize {
        self.state.lock().clients.len()
    }

    /// Drop every cached client handle
    pub fn close(&self) {
        let mut state = self.state.lock();
        let closed = state.clients.len();
        state.clients.clear();
        tracing::debug!(closed = closed, "Closed API client handles");
    }
}

// Configuration module

use arc_swap::ArcSwap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::*;

mod keys;

pub use keys::KeyList;

/// Live configuration snapshot shared by all components.
///
/// Readers call `load()` for a cheap `Arc<Config>`; the reload manager swaps
/// in a new snapshot without blocking them.
pub type SharedConfig = Arc<ArcSwap<Config>>;

/// Wrap a config in a shareable, hot-swappable handle
pub fn shared(config: Config) -> SharedConfig {
    Arc::new(ArcSwap::from_pointee(config))
}

/// Plugin configuration
///
/// Every field is optional in YAML; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generation API keys (comma-separated string or list)
    pub api_key: KeyList,
    /// Edit API keys; falls back to `api_key` when empty
    pub edit_api_key: KeyList,

    /// OpenAI-compatible API base URL
    pub base_url: String,
    /// Edit task API base URL; falls back to `base_url`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_base_url: Option<String>,

    /// Text-to-image model
    pub model: String,
    /// Default output size (`WIDTHxHEIGHT`)
    pub size: String,
    /// Inference steps sent with each generation
    pub num_inference_steps: u32,
    /// Negative prompt; empty disables it
    pub negative_prompt: String,

    /// Chat model used to refine outfit descriptions
    pub text_model: String,
    /// Refine the scheduled outfit with the text model before injecting it
    pub smart_outfit_filter: bool,

    /// HTTP timeout in seconds (downloads, edit API)
    pub timeout: u64,
    /// Timeout of a single generation call in seconds
    pub generation_timeout: u64,
    /// Maximum simultaneous generation calls across all users
    pub max_concurrent: usize,

    /// Minimum seconds between accepted requests per user
    pub debounce_interval: u64,
    /// Seconds after a successful generation before the same user may draw again
    pub completion_cooldown_seconds: u64,

    /// Run the background cache sweep
    pub cache_cleanup_enabled: bool,
    /// Images older than this are removed
    pub cache_max_age_hours: u64,
    /// At most this many images are kept
    pub cache_max_count: usize,
    /// Minutes between background sweeps
    pub cache_cleanup_interval_minutes: u64,
    /// Images younger than this are never removed by a sweep
    pub cache_protect_minutes: u64,

    /// Text prepended to every prompt when `auto_inject_persona` is set
    pub persona_prefix: String,
    pub auto_inject_persona: bool,

    /// Plugin data directory; images live in `<data_dir>/images`
    pub data_dir: PathBuf,
    /// Directories probed for relative image references from the host
    pub platform_cache_dirs: Vec<PathBuf>,
    /// JSON schedule written by a sibling scheduler plugin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outfit_schedule_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: KeyList::default(),
            edit_api_key: KeyList::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            edit_base_url: None,
            model: DEFAULT_MODEL.to_string(),
            size: DEFAULT_SIZE.to_string(),
            num_inference_steps: DEFAULT_INFERENCE_STEPS,
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            smart_outfit_filter: true,
            timeout: DEFAULT_TIMEOUT_SECS,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT_SECS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            debounce_interval: DEFAULT_DEBOUNCE_INTERVAL_SECS,
            completion_cooldown_seconds: DEFAULT_COMPLETION_COOLDOWN_SECS,
            cache_cleanup_enabled: true,
            cache_max_age_hours: DEFAULT_CACHE_MAX_AGE_HOURS,
            cache_max_count: DEFAULT_CACHE_MAX_COUNT,
            cache_cleanup_interval_minutes: DEFAULT_CACHE_CLEANUP_INTERVAL_MINUTES,
            cache_protect_minutes: DEFAULT_CACHE_PROTECT_MINUTES,
            persona_prefix: String::new(),
            auto_inject_persona: false,
            data_dir: PathBuf::from("data/aiimg"),
            platform_cache_dirs: DEFAULT_PLATFORM_CACHE_DIRS
                .iter()
                .map(PathBuf::from)
                .collect(),
            outfit_schedule_file: None,
        }
    }
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        let mut missing = None;
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    missing.get_or_insert_with(|| var_name.to_string());
                    String::new()
                }
            }
        });
        if let Some(var_name) = missing {
            return Err(format!(
                "Environment variable '{}' is referenced but not set",
                var_name
            ));
        }

        // An empty document deserializes as null; treat it as "all defaults"
        if substituted.trim().is_empty() {
            return Ok(Config::default());
        }

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be at least 1".to_string());
        }
        if self.num_inference_steps == 0 {
            return Err("num_inference_steps must be at least 1".to_string());
        }
        if self.generation_timeout == 0 {
            return Err("generation_timeout must be at least 1 second".to_string());
        }
        if self.cache_cleanup_interval_minutes == 0 {
            return Err("cache_cleanup_interval_minutes must be at least 1".to_string());
        }
        if !is_valid_size(&self.size) {
            return Err(format!(
                "size '{}' is not of the form WIDTHxHEIGHT",
                self.size
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err("base_url cannot be empty".to_string());
        }
        Ok(())
    }

    /// Base URL of the edit task API
    pub fn edit_base_url(&self) -> &str {
        self.edit_base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.base_url)
    }

    /// Generation API keys
    pub fn generation_keys(&self) -> Vec<String> {
        self.api_key.keys()
    }

    /// Edit API keys, falling back to the generation keys
    pub fn edit_keys(&self) -> Vec<String> {
        let keys = self.edit_api_key.keys();
        if keys.is_empty() {
            self.generation_keys()
        } else {
            keys
        }
    }

    /// Negative prompt, if one is configured
    pub fn negative_prompt(&self) -> Option<&str> {
        Some(self.negative_prompt.trim()).filter(|p| !p.is_empty())
    }

    pub fn image_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout)
    }

    pub fn debounce_interval(&self) -> Duration {
        Duration::from_secs(self.debounce_interval)
    }

    pub fn completion_cooldown(&self) -> Duration {
        Duration::from_secs(self.completion_cooldown_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache_cleanup_interval_minutes.saturating_mul(60))
    }
}

fn is_valid_size(size: &str) -> bool {
    match size.split_once('x') {
        Some((w, h)) => {
            !w.is_empty()
                && !h.is_empty()
                && w.bytes().all(|b| b.is_ascii_digit())
                && h.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

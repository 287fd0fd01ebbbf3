// aiimg - image generation plugin core for chat bots

pub mod admission; // Debounce, in-flight and duplicate-message gate
pub mod cache; // Bounded on-disk image cache
pub mod config;
pub mod constants;
pub mod credentials; // API key rotation and client handles
pub mod debounce;
pub mod edit; // Async edit tasks: submit + poll
pub mod error;
pub mod generation;
pub mod host; // Host bot framework contract
pub mod logging;
pub mod metrics;
pub mod outfit;
pub mod plugin;
pub mod reload; // SIGHUP configuration hot reload

pub use error::{PluginError, Result};
pub use plugin::ImagePlugin;

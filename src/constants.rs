// Constants module - centralized default values for configuration
//
// This module defines all default values used throughout the codebase.
// Using constants instead of magic numbers improves maintainability
// and makes it easier to understand and modify defaults.

use std::time::Duration;

// =============================================================================
// Remote API defaults
// =============================================================================

/// Default OpenAI-compatible API base URL
pub const DEFAULT_BASE_URL: &str = "https://ai.gitee.com/v1";

/// Default text-to-image model
pub const DEFAULT_MODEL: &str = "z-image-turbo";

/// Default output size
pub const DEFAULT_SIZE: &str = "1024x1024";

/// Default inference step count for generation
pub const DEFAULT_INFERENCE_STEPS: u32 = 9;

/// Default negative prompt sent with every generation
pub const DEFAULT_NEGATIVE_PROMPT: &str = "low quality, bad anatomy, bad hands, text, error, missing fingers, \
     extra digit, fewer digits, cropped, worst quality, normal quality, \
     jpeg artifacts, signature, watermark, username, blurry";

/// Default text model used by the outfit filter
pub const DEFAULT_TEXT_MODEL: &str = "deepseek-ai/DeepSeek-V3";

/// Default HTTP timeout in seconds (downloads, edit API)
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default timeout for a single generation call in seconds
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 50;

/// Extra transport slack on top of the generation timeout
pub const GENERATION_CLIENT_SLACK_SECS: u64 = 5;

/// Default maximum simultaneous generation calls
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

// =============================================================================
// Edit task defaults
// =============================================================================

/// Fixed model for image edit tasks
pub const EDIT_MODEL: &str = "Qwen-Image-Edit-2511";

/// Fixed inference steps for image edit tasks
pub const EDIT_INFERENCE_STEPS: &str = "4";

/// Fixed guidance scale for image edit tasks
pub const EDIT_GUIDANCE_SCALE: &str = "1.0";

/// Delay between edit task status polls
pub const EDIT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum number of edit task status polls (60 x 5s = 300s)
pub const EDIT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Task types accepted by the edit API
pub const EDIT_TASK_TYPES: &[&str] = &["id", "style", "subject", "background", "element"];

/// Task type used when a request names none
pub const DEFAULT_EDIT_TASK_TYPE: &str = "id";

// =============================================================================
// Admission defaults
// =============================================================================

/// Default debounce interval in seconds
pub const DEFAULT_DEBOUNCE_INTERVAL_SECS: u64 = 10;

/// Debounce map size that triggers opportunistic pruning
pub const DEBOUNCE_PRUNE_THRESHOLD: usize = 100;

/// Debounce records older than this are dropped when pruning
pub const DEBOUNCE_RETENTION: Duration = Duration::from_secs(300);

/// Default cooldown after a successful completion, in seconds
pub const DEFAULT_COMPLETION_COOLDOWN_SECS: u64 = 30;

/// Retention of processed-message and completion records
pub const ADMISSION_RETENTION: Duration = Duration::from_secs(600);

/// Interval of the admission maintenance loop
pub const ADMISSION_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

/// Number of message characters hashed into a fallback message id
pub const MESSAGE_ID_FALLBACK_CHARS: usize = 100;

// =============================================================================
// Cache defaults
// =============================================================================

/// Recognised image file extensions (lowercase, without dot)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// Extension used for newly saved images
pub const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

/// Default maximum image age in hours
pub const DEFAULT_CACHE_MAX_AGE_HOURS: u64 = 24;

/// Default maximum number of cached images
pub const DEFAULT_CACHE_MAX_COUNT: usize = 200;

/// Default sweep interval in minutes
pub const DEFAULT_CACHE_CLEANUP_INTERVAL_MINUTES: u64 = 30;

/// Default protection window in minutes
pub const DEFAULT_CACHE_PROTECT_MINUTES: u64 = 5;

/// Delay before the first background sweep
pub const CACHE_SWEEP_GRACE: Duration = Duration::from_secs(10);

/// Timeout for the direct-GET fallback when resolving image references
pub const IMAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Platform cache directories probed for relative image references
pub const DEFAULT_PLATFORM_CACHE_DIRS: &[&str] = &["data/Cache/Image", "data/image_cache"];

// =============================================================================
// Shutdown defaults
// =============================================================================

/// Grace period for detached edit tasks at shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

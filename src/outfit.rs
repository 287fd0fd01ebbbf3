//! Outfit enrichment for the draw tool.
//!
//! A sibling scheduler publishes "today's outfit". When one is available the
//! draw tool prefixes it to the prompt, after optionally asking the text model
//! to drop footwear the scene would not show.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::credentials::{ChatCompletionRequest, ChatMessage, CredentialRotator, Purpose};

/// Source of the current outfit description
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutfitProvider: Send + Sync {
    /// Today's outfit, or `None` when nothing is scheduled
    async fn today_outfit(&self) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct ScheduleDay {
    #[serde(default)]
    outfit: String,
}

/// Reads a scheduler's JSON file keyed by local date
///
/// ```json
/// { "2026-10-18": { "outfit": "white blouse, pleated skirt, loafers" } }
/// ```
#[derive(Debug, Clone)]
pub struct ScheduleOutfitProvider {
    path: PathBuf,
}

impl ScheduleOutfitProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Outfit scheduled for `date` (`YYYY-MM-DD`)
    pub async fn outfit_for(&self, date: &str) -> Option<String> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(file = %self.path.display(), error = %e, "Outfit schedule not readable");
                return None;
            }
        };
        let schedule: HashMap<String, ScheduleDay> = match serde_json::from_str(&raw) {
            Ok(schedule) => schedule,
            Err(e) => {
                tracing::warn!(file = %self.path.display(), error = %e, "Outfit schedule is not valid JSON");
                return None;
            }
        };
        schedule
            .get(date)
            .map(|day| day.outfit.trim().to_string())
            .filter(|outfit| !outfit.is_empty())
    }
}

#[async_trait]
impl OutfitProvider for ScheduleOutfitProvider {
    async fn today_outfit(&self) -> Option<String> {
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let outfit = self.outfit_for(&today).await;
        if let Some(ref o) = outfit {
            tracing::debug!(outfit = %o.chars().take(15).collect::<String>(), "Loaded today's outfit");
        }
        outfit
    }
}

const FILTER_SYSTEM_PROMPT: &str = "You are an expert at writing prompts for image generation. \
Given the scene description, decide whether the outfit should keep its shoes, boots or socks. \
1. Keep footwear only when the scene says full body, head to toe, or otherwise clearly shows the feet. \
2. If the scene is a close-up, a selfie, a half-body shot, or only vaguely mentions standing, remove footwear from the outfit. \
3. Output only the revised outfit text, with no explanation.";

/// Answers longer than the input by more than this are treated as chatter
const FILTER_MAX_GROWTH: usize = 20;

/// Ask the text model to trim footwear the scene would not show
///
/// Returns the original outfit on any failure or when the answer looks like
/// an explanation instead of an outfit.
pub async fn smart_filter(
    rotator: &CredentialRotator,
    text_model: &str,
    outfit: &str,
    scene: &str,
) -> String {
    let client = match rotator.get_client(Purpose::Generation) {
        Ok((client, _)) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Outfit filter unavailable, keeping original outfit");
            return outfit.to_string();
        }
    };

    let request = ChatCompletionRequest {
        model: text_model.to_string(),
        messages: vec![
            ChatMessage::system(FILTER_SYSTEM_PROMPT),
            ChatMessage::user(format!("Outfit: {}\nScene: {}", outfit, scene)),
        ],
        temperature: 0.1,
        max_tokens: 200,
    };

    match client.chat_completion(&request).await {
        Ok(answer) => accept_filtered(outfit, answer),
        Err(e) => {
            tracing::warn!(error = %e, "Outfit filter failed, keeping original outfit");
            outfit.to_string()
        }
    }
}

fn accept_filtered(original: &str, answer: String) -> String {
    let answer_len = answer.chars().count();
    if answer.is_empty() || answer_len > original.chars().count() + FILTER_MAX_GROWTH {
        return original.to_string();
    }
    tracing::debug!(original = %original, filtered = %answer, "Outfit refined");
    answer
}

/// Prefix `prompt` with an outfit description
pub fn with_outfit(outfit: &str, prompt: &str) -> String {
    format!("({}), {}", outfit, prompt)
}

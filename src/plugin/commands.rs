// Command argument parsing

use crate::constants::{DEFAULT_EDIT_TASK_TYPE, EDIT_TASK_TYPES};

/// Aspect ratios accepted by `/aiimg` and the sizes available for each
pub const SUPPORTED_RATIOS: &[(&str, &[&str])] = &[
    ("1:1", &["256x256", "512x512", "1024x1024", "2048x2048"]),
    ("4:3", &["1152x896", "2048x1536"]),
    ("3:4", &["768x1024", "1536x2048"]),
    ("3:2", &["2048x1360"]),
    ("2:3", &["1360x2048"]),
    ("16:9", &["1024x576", "2048x1152"]),
    ("9:16", &["576x1024", "1152x2048"]),
];

const SQUARE: &str = "1:1";

pub fn ratio_sizes(ratio: &str) -> Option<&'static [&'static str]> {
    SUPPORTED_RATIOS
        .iter()
        .find(|(name, _)| *name == ratio)
        .map(|(_, sizes)| *sizes)
}

/// Split a trailing ratio token off `/aiimg` arguments
///
/// Returns the prompt and the ratio, `1:1` when no known ratio is given.
pub fn split_ratio(args: &str) -> (&str, &'static str) {
    let args = args.trim();
    if let Some((prompt, last)) = args.rsplit_once(char::is_whitespace) {
        if let Some((name, _)) = SUPPORTED_RATIOS.iter().find(|(name, _)| *name == last) {
            return (prompt.trim_end(), *name);
        }
    }
    (args, SQUARE)
}

/// Output size for `ratio`
///
/// The configured default is kept for square requests when it is itself a
/// square size; otherwise the first size of the ratio is used.
pub fn resolve_size(default_size: &str, ratio: &str) -> String {
    let square = ratio_sizes(SQUARE).unwrap_or(&[]);
    if ratio == SQUARE && square.contains(&default_size) {
        return default_size.to_string();
    }
    ratio_sizes(ratio)
        .and_then(|sizes| sizes.first())
        .or_else(|| square.first())
        .map(|s| s.to_string())
        .unwrap_or_else(|| default_size.to_string())
}

/// Split a trailing task-type list off `/aiedit` arguments
///
/// The last token is taken as a comma-separated list only when every entry is
/// a known task type; otherwise it stays part of the prompt and the default
/// task type is used.
pub fn split_task_types(args: &str) -> (&str, Vec<String>) {
    let args = args.trim();
    if let Some((prompt, last)) = args.rsplit_once(char::is_whitespace) {
        let entries: Vec<&str> = last
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        if !entries.is_empty() && entries.iter().all(|t| EDIT_TASK_TYPES.contains(t)) {
            let mut types: Vec<String> = Vec::with_capacity(entries.len());
            for t in entries {
                if !types.iter().any(|existing| existing == t) {
                    types.push(t.to_string());
                }
            }
            return (prompt.trim_end(), types);
        }
    }
    (args, vec![DEFAULT_EDIT_TASK_TYPE.to_string()])
}

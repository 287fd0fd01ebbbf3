//! Cache reclamation policy.
//!
//! `plan_sweep` decides which files go; it never touches the filesystem.
//! `scan_dir` and `execute_plan` are the blocking halves around it and are
//! meant to run on a blocking worker.
//!
//! Policy, applied to files sorted oldest first:
//! - phase 1: every file older than `max_age` is deleted
//! - phase 2: the oldest survivors are deleted until at most `max_count` remain
//!
//! Files younger than `protect` are never deleted. In phase 2 a protected
//! file stops eviction, so the cap may be exceeded while recent files exist.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::Config;

use super::naming::{is_image_file, parse_timestamp};

/// One image file as seen by the sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub age: Duration,
    pub size: u64,
}

/// Limits enforced by a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPolicy {
    pub max_age: Duration,
    pub max_count: usize,
    pub protect: Duration,
}

impl SweepPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_age: Duration::from_secs(config.cache_max_age_hours.saturating_mul(3600)),
            max_count: config.cache_max_count,
            protect: Duration::from_secs(config.cache_protect_minutes.saturating_mul(60)),
        }
    }

    fn is_protected(&self, record: &FileRecord) -> bool {
        record.age <= self.protect
    }
}

/// Outcome of `plan_sweep`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepPlan {
    /// Files to delete, oldest first
    pub delete: Vec<FileRecord>,
    /// Number of files that stay
    pub keep: usize,
}

impl SweepPlan {
    pub fn planned_bytes(&self) -> u64 {
        self.delete.iter().map(|r| r.size).sum()
    }
}

/// Result of an executed sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub remaining: usize,
    pub freed_bytes: u64,
}

impl SweepReport {
    pub fn freed_mb(&self) -> f64 {
        self.freed_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Decide which files a sweep removes
pub fn plan_sweep(mut files: Vec<FileRecord>, policy: &SweepPolicy) -> SweepPlan {
    // Oldest first
    files.sort_by(|a, b| b.age.cmp(&a.age));

    let mut delete = Vec::new();
    let mut survivors = Vec::with_capacity(files.len());
    for record in files {
        if record.age > policy.max_age && !policy.is_protected(&record) {
            delete.push(record);
        } else {
            survivors.push(record);
        }
    }

    let excess = survivors.len().saturating_sub(policy.max_count);
    let evictable = survivors
        .iter()
        .take(excess)
        .take_while(|record| !policy.is_protected(record))
        .count();
    let keep = survivors.split_off(evictable);
    delete.extend(survivors);

    SweepPlan {
        keep: keep.len(),
        delete,
    }
}

/// Age of a file: from its name when it carries a timestamp, else from mtime
pub fn file_age(path: &Path, now: SystemTime) -> Duration {
    let now_secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    if let Some(ts) = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_timestamp)
    {
        return Duration::from_secs(now_secs.saturating_sub(ts));
    }

    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| now.duration_since(mtime).ok())
        .unwrap_or_default()
}

/// Collect every image file directly under `dir`
///
/// A missing directory yields no records. Files that vanish mid-scan are
/// skipped.
pub fn scan_dir(dir: &Path, now: SystemTime) -> std::io::Result<Vec<FileRecord>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut records = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !is_image_file(&path) {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        records.push(FileRecord {
            age: file_age(&path, now),
            size: metadata.len(),
            path,
        });
    }
    Ok(records)
}

/// Delete the planned files
///
/// Failures are logged and skipped; only successful deletions count.
pub fn execute_plan(plan: &SweepPlan, total: usize) -> SweepReport {
    let mut deleted = 0;
    let mut freed_bytes = 0;
    for record in &plan.delete {
        match std::fs::remove_file(&record.path) {
            Ok(()) => {
                deleted += 1;
                freed_bytes += record.size;
            }
            Err(e) => {
                tracing::warn!(
                    file = %record.path.display(),
                    error = %e,
                    "Failed to delete cached image"
                );
            }
        }
    }
    SweepReport {
        deleted,
        remaining: total - deleted,
        freed_bytes,
    }
}

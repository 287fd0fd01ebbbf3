// Cache statistics

use std::time::Duration;

use super::sweep::FileRecord;

/// Snapshot of the image directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub count: usize,
    pub size_bytes: u64,
    /// Age of the oldest file; zero when the cache is empty
    pub oldest: Duration,
}

impl CacheStats {
    pub fn from_records(records: &[FileRecord]) -> Self {
        Self {
            count: records.len(),
            size_bytes: records.iter().map(|r| r.size).sum(),
            oldest: records.iter().map(|r| r.age).max().unwrap_or_default(),
        }
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn oldest_hours(&self) -> f64 {
        self.oldest.as_secs_f64() / 3600.0
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

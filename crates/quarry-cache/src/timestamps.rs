use crate::cache::IndexCache;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Per-path last-known-cached modification time.
///
/// The value mirrors `last_modification_time` of the most recently persisted
/// index for the path; a miss falls back to the cache itself and memoizes.
#[derive(Debug, Default)]
pub struct TimestampManager {
    timestamps: Mutex<HashMap<String, i64>>,
}

impl TimestampManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_last_cached_modification_time(
        &self,
        cache: &IndexCache,
        path: &str,
    ) -> Option<i64> {
        if let Some(&time) = self.timestamps.lock().get(path) {
            return Some(time);
        }

        let time = cache.try_load(path)?.last_modification_time;
        self.timestamps.lock().insert(path.to_string(), time);
        Some(time)
    }

    pub fn update_cached_modification_time(&self, path: &str, time: i64) {
        self.timestamps.lock().insert(path.to_string(), time);
    }
}

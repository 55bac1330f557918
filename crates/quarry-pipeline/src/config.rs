use quarry_index::SerializeFormat;
use std::path::PathBuf;

/// Pipeline configuration. The embedding server loads project settings and
/// fills one of these in at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory holding cached index and source-snapshot blobs.
    pub cache_directory: PathBuf,
    pub cache_format: SerializeFormat,
    /// `< 0` disables progress reporting entirely; `0` emits on every worker
    /// pass; `> 0` rate-limits idle reports to one per that many
    /// milliseconds.
    pub progress_report_frequency_ms: i64,
    /// Number of indexer worker threads.
    pub indexer_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            cache_directory: PathBuf::from(".quarry/cache"),
            cache_format: SerializeFormat::Binary,
            progress_report_frequency_ms: 500,
            // In containers `available_parallelism()` can report the host CPU
            // count even when the process is constrained by thread limits.
            // Cap the default to keep startup reliable.
            indexer_count: available.saturating_sub(1).clamp(1, 16),
        }
    }
}

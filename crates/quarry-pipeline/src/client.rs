use parking_lot::Mutex;
use quarry_core::{Diagnostic, Range};
use serde::Serialize;

/// Queue depths and worker count, emitted to the client while progress
/// reporting is enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProgressStatus {
    #[serde(rename = "indexRequestCount")]
    pub index_request_count: usize,
    #[serde(rename = "doIdMapCount")]
    pub do_id_map_count: usize,
    #[serde(rename = "loadPreviousIndexCount")]
    pub load_previous_index_count: usize,
    #[serde(rename = "onIdMappedCount")]
    pub on_id_mapped_count: usize,
    #[serde(rename = "onIndexedCount")]
    pub on_indexed_count: usize,
    #[serde(rename = "activeThreads")]
    pub active_threads: i64,
}

impl ProgressStatus {
    pub fn is_idle(&self) -> bool {
        *self == ProgressStatus::default()
    }
}

/// Sink for everything the pipeline pushes toward the editor client.
///
/// The transport is the embedding server's concern; implementations must be
/// cheap and non-blocking on the pipeline's control path.
pub trait EditorClient: Send + Sync {
    fn publish_diagnostics(&self, path: &str, diagnostics: &[Diagnostic]);
    fn publish_inactive_regions(&self, path: &str, regions: &[Range]);
    fn refresh_semantic_highlighting(&self, path: &str);
    fn publish_progress(&self, status: ProgressStatus);
}

/// Client that discards everything; for embedders without a UI surface.
#[derive(Debug, Default)]
pub struct NullEditorClient;

impl EditorClient for NullEditorClient {
    fn publish_diagnostics(&self, _path: &str, _diagnostics: &[Diagnostic]) {}
    fn publish_inactive_regions(&self, _path: &str, _regions: &[Range]) {}
    fn refresh_semantic_highlighting(&self, _path: &str) {}
    fn publish_progress(&self, _status: ProgressStatus) {}
}

/// Client that records every push; used by tests.
#[derive(Debug, Default)]
pub struct RecordingEditorClient {
    pub diagnostics: Mutex<Vec<(String, Vec<Diagnostic>)>>,
    pub inactive_regions: Mutex<Vec<(String, Vec<Range>)>>,
    pub highlighted: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<ProgressStatus>>,
}

impl RecordingEditorClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EditorClient for RecordingEditorClient {
    fn publish_diagnostics(&self, path: &str, diagnostics: &[Diagnostic]) {
        self.diagnostics
            .lock()
            .push((path.to_string(), diagnostics.to_vec()));
    }

    fn publish_inactive_regions(&self, path: &str, regions: &[Range]) {
        self.inactive_regions
            .lock()
            .push((path.to_string(), regions.to_vec()));
    }

    fn refresh_semantic_highlighting(&self, path: &str) {
        self.highlighted.lock().push(path.to_string());
    }

    fn publish_progress(&self, status: ProgressStatus) {
        self.progress.lock().push(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_status_serializes_with_client_facing_names() {
        let status = ProgressStatus {
            index_request_count: 2,
            active_threads: 1,
            ..ProgressStatus::default()
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"indexRequestCount\":2"));
        assert!(json.contains("\"activeThreads\":1"));
    }

    #[test]
    fn idle_means_every_counter_is_zero() {
        assert!(ProgressStatus::default().is_idle());
        let busy = ProgressStatus {
            on_indexed_count: 1,
            ..ProgressStatus::default()
        };
        assert!(!busy.is_idle());
    }
}

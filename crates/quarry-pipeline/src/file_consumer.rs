use parking_lot::Mutex;
use std::collections::HashSet;

/// Set of files claimed by the in-flight parse cycle.
///
/// A multi-file parse emits at most one index per resolved path; the claim
/// set is how concurrent emitters agree on who won.
#[derive(Debug, Default)]
pub struct FileConsumerSharedState {
    used_files: Mutex<HashSet<String>>,
}

impl FileConsumerSharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `path`, returning `true` iff it was not already claimed.
    pub fn mark(&self, path: &str) -> bool {
        self.used_files.lock().insert(path.to_string())
    }

    /// Clears the claim; called when `path` must be reparsed.
    pub fn reset(&self, path: &str) {
        self.used_files.lock().remove(path);
    }

    pub fn is_empty(&self) -> bool {
        self.used_files.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_claims_once_and_reset_releases() {
        let state = FileConsumerSharedState::new();
        assert!(state.is_empty());
        assert!(state.mark("/src/h.h"));
        assert!(!state.mark("/src/h.h"));
        assert!(!state.is_empty());

        state.reset("/src/h.h");
        assert!(state.mark("/src/h.h"));
    }
}

use parking_lot::Mutex;
use std::collections::HashSet;

/// Concurrency gates for imports.
///
/// The two sets are independent: one deduplicates dependency parsing across
/// sources that share headers, the other serializes query-database admission
/// per path.
#[derive(Debug, Default)]
pub struct ImportManager {
    dependency_imports: Mutex<HashSet<String>>,
    querydb_imports: Mutex<HashSet<String>>,
}

impl ImportManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that some in-flight parse has claimed `path` as a dependency.
    /// The first caller gets `true`; everyone after gets `false`.
    pub fn try_mark_dependency_imported(&self, path: &str) -> bool {
        self.dependency_imports.lock().insert(path.to_string())
    }

    /// Reserves the right to apply an update for `path` into the query
    /// database. `false` while a prior import has not been completed.
    pub fn start_querydb_import(&self, path: &str) -> bool {
        self.querydb_imports.lock().insert(path.to_string())
    }

    pub fn done_querydb_import(&self, path: &str) {
        self.querydb_imports.lock().remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn dependency_gate_admits_exactly_one_claim() {
        let manager = ImportManager::new();
        assert!(manager.try_mark_dependency_imported("/src/h.h"));
        assert!(!manager.try_mark_dependency_imported("/src/h.h"));
        assert!(manager.try_mark_dependency_imported("/src/other.h"));
    }

    #[test]
    fn querydb_gate_is_exclusive_until_done() {
        let manager = ImportManager::new();
        assert!(manager.start_querydb_import("/src/a.cc"));
        assert!(!manager.start_querydb_import("/src/a.cc"));
        manager.done_querydb_import("/src/a.cc");
        assert!(manager.start_querydb_import("/src/a.cc"));
    }

    #[test]
    fn concurrent_claims_admit_exactly_one_winner() {
        let manager = Arc::new(ImportManager::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            handles.push(std::thread::spawn(move || {
                manager.try_mark_dependency_imported("/src/shared.h")
            }));
        }

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(winners, 1);
    }
}

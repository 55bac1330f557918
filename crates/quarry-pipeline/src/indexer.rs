use crate::messages::PerformanceImportFile;
use parking_lot::Mutex;
use quarry_index::IndexFile;
use std::collections::HashMap;

/// A file's captured contents, handed to the analyzer so indexing does not
/// race buffer edits.
#[derive(Clone, Debug)]
pub struct FileContents {
    pub path: String,
    pub content: String,
}

impl FileContents {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// The semantic analyzer: turns source text plus compile arguments into
/// symbol-bearing indexes, one per file the translation unit touches.
///
/// Deterministic with respect to its inputs. Failures surface as an empty
/// result plus logs; they never cross this boundary as errors.
/// Implementations record their parse/build phases in `perf`.
pub trait Indexer: Send + Sync {
    fn index(
        &self,
        path: &str,
        args: &[String],
        contents: &[FileContents],
        perf: &mut PerformanceImportFile,
    ) -> Vec<IndexFile>;
}

/// Deterministic stand-in analyzer: yields a configured number of index
/// files per requested path (the primary plus synthetic headers).
#[derive(Debug, Default)]
pub struct TestIndexer {
    entries: HashMap<String, usize>,
    calls: Mutex<Vec<String>>,
}

impl TestIndexer {
    pub fn new(entries: impl IntoIterator<Item = (String, usize)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Paths this indexer has been invoked for, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl Indexer for TestIndexer {
    fn index(
        &self,
        path: &str,
        _args: &[String],
        _contents: &[FileContents],
        _perf: &mut PerformanceImportFile,
    ) -> Vec<IndexFile> {
        self.calls.lock().push(path.to_string());

        let Some(&count) = self.entries.get(path) else {
            return Vec::new();
        };

        (0..count)
            .map(|i| {
                let file_path = if i == 0 {
                    path.to_string()
                } else {
                    format!("{path}.{i}.h")
                };
                let mut file = IndexFile::new(file_path);
                file.import_file = path.to_string();
                file
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexer_yields_the_configured_file_count() {
        let indexer = TestIndexer::new([("foo.cc".to_string(), 3)]);
        let mut perf = PerformanceImportFile::default();
        let files = indexer.index("foo.cc", &[], &[], &mut perf);
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].path, "foo.cc");
        assert_eq!(files[1].path, "foo.cc.1.h");
        assert!(files.iter().all(|f| f.import_file == "foo.cc"));

        assert!(indexer.index("bar.cc", &[], &[], &mut perf).is_empty());
        assert_eq!(indexer.calls(), vec!["foo.cc", "bar.cc"]);
    }
}

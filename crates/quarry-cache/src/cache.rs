use crate::error::Result;
use crate::util::{atomic_write, read_file_limited};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use quarry_index::{IndexFile, SerializeFormat, INDEX_FILE_VERSION};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Per-path cache of serialized indexes and their source snapshots.
///
/// Layout under the cache root, one pair per source path:
/// - `<sha256(path)>.idx` (the serialized [`IndexFile`])
/// - `<sha256(path)>.src` (the source text the index was computed from)
///
/// An in-memory map fronts the disk blobs. Entries loaned out by
/// [`IndexCache::try_load`] are borrowed for the duration of the returned
/// guard; callers that need to mutate or keep an index take ownership via
/// the `take` variants.
#[derive(Debug)]
pub struct IndexCache {
    root: PathBuf,
    format: SerializeFormat,
    loaded: Mutex<HashMap<String, IndexFile>>,
}

impl IndexCache {
    pub fn new(root: impl Into<PathBuf>, format: SerializeFormat) -> Self {
        Self {
            root: root.into(),
            format,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Borrowed view of the index for `path`, reading it from disk into the
    /// in-memory map on first access. `None` when no valid payload exists.
    pub fn try_load(&self, path: &str) -> Option<MappedMutexGuard<'_, IndexFile>> {
        let mut loaded = self.loaded.lock();
        if !loaded.contains_key(path) {
            let file = self.load_from_disk(path)?;
            loaded.insert(path.to_string(), file);
        }
        Some(MutexGuard::map(loaded, |map| {
            map.get_mut(path).expect("entry inserted above")
        }))
    }

    /// Owned index for `path`: removes the in-memory entry if resident,
    /// otherwise deserializes from disk. `None` when no valid payload exists.
    pub fn try_take_or_load(&self, path: &str) -> Option<IndexFile> {
        if let Some(file) = self.loaded.lock().remove(path) {
            return Some(file);
        }
        self.load_from_disk(path)
    }

    /// Owned index for `path`; the caller has already proven presence.
    pub fn take_or_load(&self, path: &str) -> IndexFile {
        self.try_take_or_load(path)
            .unwrap_or_else(|| panic!("cached index for {path} must exist"))
    }

    /// Visits every resident index while holding the cache lock. The
    /// callback must not re-enter the cache.
    pub fn iterate_loaded(&self, mut visit: impl FnMut(&IndexFile)) {
        let loaded = self.loaded.lock();
        for file in loaded.values() {
            visit(file);
        }
    }

    /// Serializes and persists `file` plus its source snapshot.
    pub fn write_to_cache(&self, file: &mut IndexFile) -> Result<()> {
        let bytes = quarry_index::serialize(self.format, file)?;
        atomic_write(&self.index_path(&file.path), &bytes)?;
        atomic_write(&self.content_path(&file.path), file.file_contents.as_bytes())?;
        Ok(())
    }

    /// Source text as it looked when the cached index was produced.
    pub fn load_cached_file_contents(&self, path: &str) -> Option<String> {
        let bytes = read_file_limited(&self.content_path(path))?;
        String::from_utf8(bytes).ok()
    }

    fn load_from_disk(&self, path: &str) -> Option<IndexFile> {
        let bytes = read_file_limited(&self.index_path(path))?;
        let file = quarry_index::deserialize(self.format, path, &bytes, INDEX_FILE_VERSION);
        if file.is_none() {
            tracing::debug!(
                target = "quarry.cache",
                path = %path,
                "discarding incompatible cached index"
            );
        }
        file
    }

    fn index_path(&self, path: &str) -> PathBuf {
        self.root.join(format!("{}.idx", artifact_stem(path)))
    }

    fn content_path(&self, path: &str) -> PathBuf {
        self.root.join(format!("{}.src", artifact_stem(path)))
    }
}

fn artifact_stem(path: &str) -> String {
    hex::encode(Sha256::digest(path.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_stems_are_stable_and_distinct() {
        assert_eq!(artifact_stem("/src/a.cc"), artifact_stem("/src/a.cc"));
        assert_ne!(artifact_stem("/src/a.cc"), artifact_stem("/src/b.cc"));
    }
}

//! Thin file-system probes used by the indexing pipeline.

use std::path::Path;
use std::time::UNIX_EPOCH;

/// Returns the last modification time of `path` in whole seconds since the
/// Unix epoch, or `None` if the file cannot be stat'ed.
pub fn last_modification_time(path: impl AsRef<Path>) -> Option<i64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    match modified.duration_since(UNIX_EPOCH) {
        Ok(since) => Some(since.as_secs() as i64),
        // Clamp pre-epoch timestamps; they still compare stable.
        Err(before) => Some(-(before.duration().as_secs() as i64)),
    }
}

/// Reads a file as UTF-8, returning `None` on any failure.
pub fn read_content(path: impl AsRef<Path>) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_report_missing_files_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.cc");
        assert_eq!(last_modification_time(&missing), None);
        assert_eq!(read_content(&missing), None);
    }

    #[test]
    fn probes_read_existing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.cc");
        std::fs::write(&path, "int main() {}").unwrap();

        assert_eq!(read_content(&path).as_deref(), Some("int main() {}"));
        assert!(last_modification_time(&path).is_some());
    }
}

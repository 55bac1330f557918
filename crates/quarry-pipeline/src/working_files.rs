use parking_lot::Mutex;
use std::collections::HashMap;

/// One open editor buffer.
#[derive(Clone, Debug)]
pub struct WorkingFile {
    pub path: String,
    pub version: i32,
    /// What the editor currently shows.
    pub buffer_content: String,
    /// The content the last applied index was computed against; line mapping
    /// for markers diffs the two.
    index_content: String,
}

impl WorkingFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            version: 0,
            index_content: content.clone(),
            buffer_content: content,
        }
    }

    pub fn index_content(&self) -> &str {
        &self.index_content
    }

    pub fn set_index_content(&mut self, content: String) {
        self.index_content = content;
    }

    pub fn buffer_lines(&self) -> Vec<&str> {
        self.buffer_content.lines().collect()
    }
}

/// Registry of open editor buffers, keyed by path.
#[derive(Debug, Default)]
pub struct WorkingFiles {
    files: Mutex<HashMap<String, WorkingFile>>,
}

impl WorkingFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, path: &str, content: &str) {
        self.files
            .lock()
            .insert(path.to_string(), WorkingFile::new(path, content));
    }

    pub fn close(&self, path: &str) {
        self.files.lock().remove(path);
    }

    pub fn is_open(&self, path: &str) -> bool {
        self.files.lock().contains_key(path)
    }

    /// Runs `f` against the open buffer for `path`, if any.
    pub fn with_file<R>(&self, path: &str, f: impl FnOnce(&mut WorkingFile) -> R) -> Option<R> {
        self.files.lock().get_mut(path).map(f)
    }
}

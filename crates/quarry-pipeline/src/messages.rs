use quarry_db::{IdMap, IndexUpdate};
use quarry_index::IndexFile;

/// Elapsed microseconds per pipeline phase, carried along with each message
/// so a request's full cost can be reported at the end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PerformanceImportFile {
    pub index_parse: u64,
    pub index_build: u64,
    pub index_save_to_disk: u64,
    pub index_load_cached: u64,
    pub querydb_id_map: u64,
    pub index_make_delta: u64,
}

/// "Please (re)index this source file."
#[derive(Clone, Debug)]
pub struct IndexRequest {
    pub path: String,
    pub args: Vec<String>,
    /// Originated from a live editor buffer; bypasses the timestamp gate.
    pub is_interactive: bool,
    pub contents: String,
}

/// A produced index on its way into the query database.
#[derive(Debug)]
pub struct IndexDoIdMap {
    pub current: IndexFile,
    pub previous: Option<IndexFile>,
    pub perf: PerformanceImportFile,
    pub is_interactive: bool,
    pub write_to_disk: bool,
    /// Set once the previous index has been requested from the cache, so
    /// the reroute through `load_previous_index` happens at most once.
    pub load_previous: bool,
}

impl IndexDoIdMap {
    pub fn new(
        current: IndexFile,
        perf: PerformanceImportFile,
        is_interactive: bool,
        write_to_disk: bool,
    ) -> Self {
        Self {
            current,
            previous: None,
            perf,
            is_interactive,
            write_to_disk,
            load_previous: false,
        }
    }
}

/// An index together with its local→global id translation.
#[derive(Debug)]
pub struct MappedIndex {
    pub file: IndexFile,
    pub ids: IdMap,
}

#[derive(Debug)]
pub struct IndexOnIdMapped {
    pub current: MappedIndex,
    pub previous: Option<MappedIndex>,
    pub perf: PerformanceImportFile,
    pub is_interactive: bool,
    pub write_to_disk: bool,
}

#[derive(Debug)]
pub struct IndexOnIndexed {
    pub update: IndexUpdate,
    pub perf: PerformanceImportFile,
}

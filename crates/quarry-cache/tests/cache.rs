use pretty_assertions::assert_eq;
use quarry_cache::{IndexCache, TimestampManager};
use quarry_index::{IndexFile, SerializeFormat};
use tempfile::TempDir;

fn sample_index(path: &str) -> IndexFile {
    let mut file = IndexFile::new(path);
    file.last_modification_time = 1_600_000_000;
    file.file_contents = "int x;".to_string();
    let id = file.var_id_for_usr("c:@x");
    file.var_mut(id).def.short_name = "x".to_string();
    file
}

#[test]
fn write_then_load_roundtrips_through_disk() {
    for format in [SerializeFormat::Json, SerializeFormat::Binary] {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path(), format);

        let mut index = sample_index("/src/a.cc");
        cache.write_to_cache(&mut index).unwrap();

        // A fresh cache instance forces the disk path.
        let cache = IndexCache::new(tmp.path(), format);
        let loaded = cache.try_take_or_load("/src/a.cc").expect("cached index");
        assert_eq!(loaded.vars[0].def.short_name, "x");
        assert_eq!(loaded.last_modification_time, 1_600_000_000);

        assert_eq!(
            cache.load_cached_file_contents("/src/a.cc").as_deref(),
            Some("int x;")
        );
    }
}

#[test]
fn corrupt_payload_is_a_miss() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCache::new(tmp.path(), SerializeFormat::Json);

    let mut index = sample_index("/src/a.cc");
    cache.write_to_cache(&mut index).unwrap();

    for entry in std::fs::read_dir(tmp.path()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "idx") {
            std::fs::write(&path, b"{definitely not an index").unwrap();
        }
    }

    let cache = IndexCache::new(tmp.path(), SerializeFormat::Json);
    assert!(cache.try_load("/src/a.cc").is_none());
}

#[test]
fn take_removes_the_resident_entry_but_not_the_blob() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCache::new(tmp.path(), SerializeFormat::Binary);

    let mut index = sample_index("/src/a.cc");
    cache.write_to_cache(&mut index).unwrap();

    assert!(cache.try_load("/src/a.cc").is_some());
    let mut seen = Vec::new();
    cache.iterate_loaded(|file| seen.push(file.path.clone()));
    assert_eq!(seen, vec!["/src/a.cc".to_string()]);

    let taken = cache.take_or_load("/src/a.cc");
    assert_eq!(taken.path, "/src/a.cc");

    seen.clear();
    cache.iterate_loaded(|file| seen.push(file.path.clone()));
    assert!(seen.is_empty());

    // The disk blob is still there, so a later take reloads it.
    assert!(cache.try_take_or_load("/src/a.cc").is_some());
}

#[test]
fn missing_paths_are_a_miss() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCache::new(tmp.path(), SerializeFormat::Json);
    assert!(cache.try_load("/src/never-indexed.cc").is_none());
    assert!(cache.try_take_or_load("/src/never-indexed.cc").is_none());
    assert!(cache.load_cached_file_contents("/src/never-indexed.cc").is_none());
}

#[test]
fn timestamps_memoize_and_fall_back_to_the_cache() {
    let tmp = TempDir::new().unwrap();
    let cache = IndexCache::new(tmp.path(), SerializeFormat::Binary);

    let mut index = sample_index("/src/a.cc");
    cache.write_to_cache(&mut index).unwrap();

    let cache = IndexCache::new(tmp.path(), SerializeFormat::Binary);
    let timestamps = TimestampManager::new();

    assert_eq!(
        timestamps.get_last_cached_modification_time(&cache, "/src/a.cc"),
        Some(1_600_000_000)
    );
    assert_eq!(
        timestamps.get_last_cached_modification_time(&cache, "/src/other.cc"),
        None
    );

    // The memoized value wins over whatever the cache would now report.
    timestamps.update_cached_modification_time("/src/a.cc", 42);
    assert_eq!(
        timestamps.get_last_cached_modification_time(&cache, "/src/a.cc"),
        Some(42)
    );
}

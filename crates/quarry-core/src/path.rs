//! Path helpers for file-system keyed maps.

/// Folds a path for use as a map key on case-insensitive file systems.
///
/// Windows and macOS file systems are case-insensitive by default, so two
/// spellings of the same path must collapse to one key.
pub fn fold_path_case(path: &str) -> String {
    if cfg!(any(target_os = "windows", target_os = "macos")) {
        path.to_lowercase()
    } else {
        path.to_string()
    }
}

/// Returns the final component of `path`.
///
/// Paths with a trailing separator are returned unchanged; callers feed
/// resolved file paths, not directories.
pub fn base_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) if idx + 1 < path.len() => &path[idx + 1..],
        _ => path,
    }
}

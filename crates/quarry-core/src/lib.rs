//! Shared, dependency-minimized core types used across Quarry.

pub mod fs;
pub mod path;
pub mod text;

/// The current Quarry version.
///
/// Used for on-disk cache compatibility checks.
pub const QUARRY_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use path::{base_name, fold_path_case};
pub use text::{Diagnostic, DiagnosticSeverity, Position, Range};

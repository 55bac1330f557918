//! Per-translation-unit semantic indexes and their persisted form.

mod file;
mod serialize;

pub use file::*;
pub use serialize::*;

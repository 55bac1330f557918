//! The in-memory query database: the aggregation of all admitted indexes,
//! plus the id translation and delta machinery that feeds it.

mod db;
mod id_map;
mod update;

pub use db::*;
pub use id_map::*;
pub use update::*;

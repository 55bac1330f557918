//! The indexing pipeline: queues, concurrency gates, and the staged workers
//! that turn index requests into query-database updates.

mod client;
mod config;
mod file_consumer;
mod import_manager;
mod indexer;
mod messages;
mod pipeline;
mod queue;
mod working_files;

pub use client::*;
pub use config::Config;
pub use file_consumer::FileConsumerSharedState;
pub use import_manager::ImportManager;
pub use indexer::*;
pub use messages::*;
pub use pipeline::*;
pub use queue::{MultiQueueWaiter, QueueDepth, ThreadedQueue};
pub use working_files::{WorkingFile, WorkingFiles};

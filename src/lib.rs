//! swcache - offline caching agent
//!
//! Pre-caches an application's resources into a bucket named after its
//! version, answers GET requests cache-first with network fallback, and
//! deletes older buckets when a new version activates.

pub mod agent;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod event_log;
pub mod network;
pub mod runtime;
pub mod ui;

#[cfg(test)]
mod testing;

pub use error::{SwcacheError, SwcacheResult};

//! Generational cache buckets
//!
//! A bucket maps GET request identities to stored responses. Buckets are
//! named `<app>-cache-<version>`; the bucket whose name matches the running
//! version is current and every other bucket is stale.
//!
//! # Bucket Lifecycle
//!
//! | Phase | Effect on buckets |
//! |-------|-------------------|
//! | Install | current bucket opened and filled with the manifest |
//! | Activate | every stale bucket deleted |
//! | Fetch | read-only lookups across all buckets |

pub mod disk;
pub mod key;
pub mod memory;
pub mod storage;

pub use disk::{format_bytes, BucketInfo, DiskCacheStorage};
pub use key::{bucket_name, validate_bucket_name, CacheEntry, RequestKey};
pub use memory::MemoryCacheStorage;
pub use storage::CacheStorage;

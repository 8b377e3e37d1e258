//! Durable cache for rendered diagrams.
//!
//! Rendered diagrams are keyed by a content hash, so an entry never needs to be
//! invalidated: when the diagram source or the active configuration changes, the
//! hash changes and the old entry is simply never asked for again.
//!
//! - [`Cache`]: Factory for named cache buckets
//! - [`CacheBucket`]: Raw byte key-value store
//! - [`CacheBucketExt`]: UTF-8 string helpers on top of any bucket
//! - [`FileCache`]: File-based implementation with version validation
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use inkset_cache::{Cache, CacheBucketExt, FileCache};
//!
//! let cache = FileCache::open(PathBuf::from(".inkset/cache"), "1");
//! let bucket = cache.bucket("diagrams");
//! bucket.set_string("3f2a", "<svg></svg>");
//! assert_eq!(bucket.get_string("3f2a").as_deref(), Some("<svg></svg>"));
//! ```

mod ext;
mod file;

pub use ext::CacheBucketExt;
pub use file::FileCache;

/// A named partition within a [`Cache`].
///
/// Keys are opaque strings chosen by the caller. For diagrams the key is the
/// content hash, which is also a safe file name.
pub trait CacheBucket: Send + Sync {
    /// Retrieve a cached value, or `None` if the key was never stored.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store a value, overwriting any existing entry for the same key.
    ///
    /// Failures are logged and swallowed; a missing entry only costs a
    /// re-render on the next run.
    fn set(&self, key: &str, value: &[u8]);
}

/// Factory for named cache [`CacheBucket`]s.
///
/// Buckets are logically isolated from each other. A file-based cache stores
/// each bucket in its own subdirectory.
pub trait Cache: Send + Sync {
    /// Open or create a named bucket.
    ///
    /// Calling `bucket` multiple times with the same name returns independent
    /// handles that share the same underlying storage.
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;
}

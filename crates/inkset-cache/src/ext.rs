//! Extension trait for [`CacheBucket`] with string convenience methods.

use crate::CacheBucket;

/// String helpers for [`CacheBucket`].
///
/// Rendered SVG is text, while buckets only deal in bytes. Keeping the
/// conversion in a blanket-implemented extension trait leaves [`CacheBucket`]
/// object-safe and minimal for implementors.
pub trait CacheBucketExt: CacheBucket {
    /// Retrieve a cached UTF-8 string.
    ///
    /// Returns `None` on cache miss or invalid UTF-8.
    fn get_string(&self, key: &str) -> Option<String> {
        let bytes = self.get(key)?;
        String::from_utf8(bytes).ok()
    }

    /// Store a string value in the cache.
    fn set_string(&self, key: &str, value: &str) {
        self.set(key, value.as_bytes());
    }
}

impl<B: CacheBucket + ?Sized> CacheBucketExt for B {}

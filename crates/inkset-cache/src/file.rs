//! File-based cache implementation.
//!
//! [`FileCache`] stores each entry as a plain file inside a bucket directory.
//! Entries are written to a temporary file in the same directory and renamed
//! into place, so a reader never observes a half-written SVG even when two
//! renders of the same hash race each other.
//!
//! On open, [`FileCache`] validates a `VERSION` file in the cache root. If the
//! version mismatches or is missing, the entire cache directory is wiped and
//! recreated. This is the only form of bulk invalidation; individual entries
//! are never evicted.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::{Cache, CacheBucket};

/// File-based [`Cache`] rooted at a directory on disk.
///
/// Directory layout:
/// ```text
/// {root}/
/// +-- VERSION            # contains the cache version string
/// +-- diagrams/          # bucket "diagrams"
///     +-- 9c1e...        # one SVG per content hash
/// ```
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open a file-based cache at `root`, validating the cache version.
    ///
    /// If the `VERSION` file inside `root` does not match `version`, the entire
    /// cache directory is removed and recreated with the new version. Errors
    /// during validation are logged but never fatal.
    #[must_use]
    pub fn open(root: PathBuf, version: &str) -> Self {
        validate_version(&root, version);
        Self { root }
    }

    /// Root directory of this cache.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Cache for FileCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(FileCacheBucket {
            dir: self.root.join(name),
        })
    }
}

/// A single bucket backed by a directory on disk.
struct FileCacheBucket {
    dir: PathBuf,
}

impl FileCacheBucket {
    fn write_entry(&self, path: &Path, value: &[u8]) -> std::io::Result<()> {
        let parent = path.parent().unwrap_or(&self.dir);
        fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(value)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl CacheBucket for FileCacheBucket {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.dir.join(key)).ok()
    }

    fn set(&self, key: &str, value: &[u8]) {
        let path = self.dir.join(key);
        if let Err(e) = self.write_entry(&path, value) {
            tracing::warn!(key, "failed to write cache entry: {e}");
        }
    }
}

/// Validate the cache version, wiping the directory on mismatch.
fn validate_version(root: &Path, version: &str) {
    let version_file = root.join("VERSION");

    match fs::read_to_string(&version_file) {
        Ok(stored) if stored == version => {
            tracing::debug!("cache version matches: {version}");
            return;
        }
        Ok(stored) => {
            tracing::info!(
                "cache version mismatch (stored={stored}, current={version}), wiping cache"
            );
        }
        Err(_) => {
            tracing::info!("no cache VERSION file found, initializing cache");
        }
    }

    if root.exists()
        && let Err(e) = fs::remove_dir_all(root)
    {
        tracing::warn!("failed to remove cache directory: {e}");
    }
    if let Err(e) = fs::create_dir_all(root) {
        tracing::warn!("failed to create cache directory: {e}");
        return;
    }
    if let Err(e) = fs::write(&version_file, version) {
        tracing::warn!("failed to write cache VERSION file: {e}");
    }
}

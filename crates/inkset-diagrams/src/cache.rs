//! Diagram cache key computation.
//!
//! Provides [`DiagramKey`] for computing the content hash that names a
//! rendered diagram in the cache and in its placeholder marker.

use std::fmt;

use inkset_config::DiagramsConfig;
use sha2::{Digest, Sha256};

/// Hex-encoded content hash of a diagram body and the active configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wrap an already computed hash, e.g. one read back from a marker.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// JSON encoding of the active [`DiagramsConfig`], computed once per pipeline.
#[derive(Debug, Clone)]
pub struct ConfigFingerprint(String);

impl ConfigFingerprint {
    #[must_use]
    pub fn new(config: &DiagramsConfig) -> Self {
        // Plain data with string keys: serde_json has no failure path here.
        let json = serde_json::to_string(config).expect("diagram config serializes to JSON");
        Self(json)
    }
}

/// Diagram parameters for cache key computation.
#[derive(Debug)]
pub struct DiagramKey<'a> {
    /// Raw block body as written in the document.
    pub body: &'a str,
    /// Fingerprint of the configuration the body is rendered under.
    pub config: &'a ConfigFingerprint,
}

impl DiagramKey<'_> {
    /// Compute the content hash for this key.
    ///
    /// # Hash Format
    ///
    /// SHA-256 of `json(body) + json(config)`, where `body` has CRLF line
    /// endings normalized to LF. JSON-encoding the body keeps the boundary
    /// between body and configuration unambiguous.
    #[must_use]
    pub fn compute_hash(&self) -> ContentHash {
        let body = self.body.replace("\r\n", "\n");
        let body_json = serde_json::Value::String(body).to_string();

        let mut hasher = Sha256::new();
        hasher.update(body_json.as_bytes());
        hasher.update(self.config.0.as_bytes());
        ContentHash(hex::encode(hasher.finalize()))
    }
}

//! Internal constants for diagram rendering.

/// Cache bucket holding rendered SVGs keyed by content hash.
pub const CACHE_BUCKET: &str = "diagrams";

/// Environment variable carrying backend options for [`crate::CommandRenderer`].
pub const RENDER_OPTIONS_ENV: &str = "INKSET_RENDER_OPTIONS";

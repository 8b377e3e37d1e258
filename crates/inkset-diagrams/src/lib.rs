//! Diagram rendering, caching and substitution for inkset.
//!
//! Diagrams are handled in two passes around a host markdown pipeline:
//!
//! 1. [`DiagramPipeline::prepare`] runs on raw source. It extracts fenced
//!    diagram blocks, renders cache misses through the process-wide
//!    [`RenderQueue`] and replaces every block with a placeholder comment.
//! 2. [`DiagramPipeline::finish`] runs on rendered HTML. It injects the font
//!    stylesheet and replaces each placeholder with the cached SVG, applying
//!    the block's mask and scale modifiers.
//!
//! # Architecture
//!
//! - [`extract`]: Fence grammar and variant flags
//! - [`placeholder`]: Marker format shared by both passes
//! - [`queue`]: Single-concurrency FIFO render queue
//! - [`render`]: `Renderer` seam and the external-command backend
//! - [`svg`]: Rescale and masked-invert transforms
//! - [`insert`]: Late-pass substitution and head injection
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use inkset_cache::{Cache, FileCache};
//! use inkset_config::DiagramsConfig;
//! use inkset_diagrams::{CommandRenderer, DiagramPipeline, PageContext, RenderQueue, TracingLogger};
//!
//! let cache = FileCache::open(".inkset/cache".into(), "1");
//! let queue = Arc::new(RenderQueue::create(Arc::new(TracingLogger)));
//! let renderer = Arc::new(CommandRenderer::new("tikz2svg", Vec::new()));
//! let pipeline = DiagramPipeline::new(
//!     DiagramsConfig::default(),
//!     Arc::from(cache.bucket("diagrams")),
//!     renderer,
//!     Arc::clone(&queue),
//! );
//!
//! let prepared = pipeline.prepare(markdown, true).await;
//! let html = render_markdown(&prepared.content);
//! let page = PageContext { has_diagrams: prepared.has_diagrams(), aggregates_diagrams: false };
//! let html = pipeline.finish(html, page);
//! queue.drain().await;
//! ```

mod cache;
mod consts;
pub mod extract;
pub mod insert;
mod pipeline;
pub mod placeholder;
pub mod queue;
pub mod render;
pub mod svg;

pub use cache::{ConfigFingerprint, ContentHash, DiagramKey};
pub use consts::{CACHE_BUCKET, RENDER_OPTIONS_ENV};
pub use extract::{DiagramFlags, ExtractedBlock, Extraction, Extractor, ScaleFlag, SourceBlock};
pub use insert::{Inserter, PageContext};
pub use pipeline::{DiagramPipeline, PrepareStats, PreparedDocument};
pub use placeholder::{Placeholder, PlaceholderPattern};
pub use queue::{QueueLogger, RenderQueue, RenderTask, TaskFuture, TracingLogger};
pub use render::{CommandRenderer, RenderError, RenderFuture, RenderOptions, Renderer};

//! Two-pass orchestration around a host document pipeline.
//!
//! [`DiagramPipeline::prepare`] runs on raw source before the host renders it:
//! it extracts diagram blocks, renders cache misses through the shared
//! [`RenderQueue`] and leaves placeholder markers behind.
//! [`DiagramPipeline::finish`] runs on the host's rendered output and swaps the
//! markers for cached SVGs.

use std::collections::HashSet;
use std::sync::Arc;

use inkset_cache::{CacheBucket, CacheBucketExt};
use inkset_config::DiagramsConfig;

use crate::cache::{ConfigFingerprint, DiagramKey};
use crate::extract::{ExtractedBlock, Extractor};
use crate::insert::{Inserter, PageContext};
use crate::queue::RenderQueue;
use crate::render::{RenderOptions, Renderer};

/// Per-document render counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareStats {
    /// Diagrams rendered and stored during this pass.
    pub rendered: usize,
    /// Diagrams already present in the cache.
    pub cached: usize,
    /// Diagrams whose render failed; their markers will be dropped.
    pub failed: usize,
}

/// Result of the early pass over one document.
#[derive(Debug, Default)]
pub struct PreparedDocument {
    /// Source with diagram blocks replaced by markers.
    pub content: String,
    /// Extracted blocks in document order.
    pub diagrams: Vec<ExtractedBlock>,
    pub stats: PrepareStats,
}

impl PreparedDocument {
    #[must_use]
    pub fn has_diagrams(&self) -> bool {
        !self.diagrams.is_empty()
    }
}

/// Diagram processing shared by every document of a build.
pub struct DiagramPipeline {
    config: DiagramsConfig,
    fingerprint: ConfigFingerprint,
    extractor: Extractor,
    inserter: Inserter,
    cache: Arc<dyn CacheBucket>,
    renderer: Arc<dyn Renderer>,
    queue: Arc<RenderQueue>,
    options: RenderOptions,
}

impl DiagramPipeline {
    #[must_use]
    pub fn new(
        config: DiagramsConfig,
        cache: Arc<dyn CacheBucket>,
        renderer: Arc<dyn Renderer>,
        queue: Arc<RenderQueue>,
    ) -> Self {
        let options = RenderOptions {
            verbose: false,
            extra: config.renderer_options.clone(),
        };
        Self {
            fingerprint: ConfigFingerprint::new(&config),
            extractor: Extractor::new(&config.tag),
            inserter: Inserter::new(&config),
            config,
            cache,
            renderer,
            queue,
            options,
        }
    }

    /// Let the renderer print its own diagnostics.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.options.verbose = verbose;
        self
    }

    /// Early pass over raw document source.
    ///
    /// Documents that did not opt in are returned unchanged unless
    /// `every_page` is set. Render failures are logged and counted; they never
    /// fail the document.
    pub async fn prepare(&self, source: &str, opted_in: bool) -> PreparedDocument {
        if !opted_in && !self.config.every_page {
            return PreparedDocument {
                content: source.to_owned(),
                ..PreparedDocument::default()
            };
        }

        let extraction = self.extractor.extract(source, |body| {
            DiagramKey {
                body,
                config: &self.fingerprint,
            }
            .compute_hash()
        });

        let mut stats = PrepareStats::default();
        let mut attempted = HashSet::new();

        for diagram in &extraction.blocks {
            let hash = diagram.hash.as_str();
            if !attempted.insert(hash) {
                continue;
            }
            if self.cache.get(hash).is_some() {
                tracing::debug!(hash, "diagram cached");
                stats.cached += 1;
                continue;
            }

            let render = self
                .renderer
                .render(diagram.block.body.trim(), &self.options);
            match self.queue.run(render).await {
                Ok(svg) => {
                    self.cache.set_string(hash, svg.trim());
                    tracing::debug!(hash, "diagram rendered");
                    stats.rendered += 1;
                }
                Err(e) => {
                    tracing::warn!(hash, error = %e, "diagram render failed");
                    stats.failed += 1;
                }
            }
        }

        PreparedDocument {
            content: extraction.content,
            diagrams: extraction.blocks,
            stats,
        }
    }

    /// Late pass over the host's rendered output.
    ///
    /// Pages the pass does not apply to are returned unchanged.
    #[must_use]
    pub fn finish(&self, output: String, page: PageContext) -> String {
        self.inserter
            .insert(&output, page, self.cache.as_ref())
            .unwrap_or(output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use inkset_cache::{Cache, FileCache};
    use tempfile::TempDir;

    use super::*;
    use crate::queue::TracingLogger;
    use crate::render::{RenderError, RenderFuture};
    use pretty_assertions::assert_eq;

    const SVG: &str = r#"<svg width="10.000" height="20.000" viewBox="0 0 10 20"><path d="M0 0"/></svg>"#;

    /// Answers every body with [`SVG`] unless it contains `fail`.
    ///
    /// Each call takes a couple of milliseconds and records how many calls
    /// were running at once.
    #[derive(Default)]
    struct StubRenderer {
        calls: AtomicUsize,
        sources: Mutex<Vec<String>>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Renderer for StubRenderer {
        fn render(&self, source: &str, _options: &RenderOptions) -> RenderFuture {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sources.lock().unwrap().push(source.to_owned());
            let fail = source.contains("fail");
            let active = Arc::clone(&self.active);
            let peak = Arc::clone(&self.peak);
            Box::pin(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                if fail {
                    Err(RenderError::Empty)
                } else {
                    Ok(format!("\n{SVG}\n"))
                }
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        cache: Arc<dyn CacheBucket>,
        renderer: Arc<StubRenderer>,
        queue: Arc<RenderQueue>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let cache = FileCache::open(dir.path().join("cache"), "1");
            Self {
                cache: Arc::from(cache.bucket("diagrams")),
                _dir: dir,
                renderer: Arc::new(StubRenderer::default()),
                queue: Arc::new(RenderQueue::create(Arc::new(TracingLogger))),
            }
        }

        fn pipeline(&self, config: DiagramsConfig) -> DiagramPipeline {
            DiagramPipeline::new(
                config,
                Arc::clone(&self.cache),
                Arc::clone(&self.renderer) as Arc<dyn Renderer>,
                Arc::clone(&self.queue),
            )
        }

        fn calls(&self) -> usize {
            self.renderer.calls.load(Ordering::SeqCst)
        }
    }

    fn diagram_page(html_body: &str) -> String {
        format!("<html><head></head><body>{html_body}</body></html>")
    }

    #[tokio::test]
    async fn test_plain_block_end_to_end() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(DiagramsConfig::default());

        let prepared = pipeline
            .prepare("```tikz\n\\draw (0,0) -- (1,1);\n```\n", true)
            .await;

        assert_eq!(prepared.stats.rendered, 1);
        let hash = prepared.diagrams[0].hash.clone();
        assert_eq!(
            prepared.content,
            format!("<!-- tikz-placeholder-{hash} -->\n")
        );
        assert_eq!(
            fixture.renderer.sources.lock().unwrap().as_slice(),
            ["\\draw (0,0) -- (1,1);".to_owned()]
        );
        assert_eq!(fixture.cache.get_string(hash.as_str()).as_deref(), Some(SVG));

        let page = PageContext {
            has_diagrams: prepared.has_diagrams(),
            aggregates_diagrams: false,
        };
        let html = pipeline.finish(diagram_page(&prepared.content), page);
        assert!(html.contains(&format!(r#"<p><span class="tikz">{SVG}</span></p>"#)));
        assert!(html.contains("node-tikzjax@latest/css/fonts.css"));
        assert!(!html.contains("<mask"));
        assert!(!html.contains("<filter"));
        assert!(html.contains(r#"width="10.000" height="20.000""#));
        assert!(!html.contains("placeholder"));
    }

    #[tokio::test]
    async fn test_identical_blocks_render_once() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(DiagramsConfig::default());
        let source = "```tikz\nsame\n```\n\n```tikz-mask\nsame\n```\n";

        let prepared = pipeline.prepare(source, true).await;

        assert_eq!(prepared.diagrams.len(), 2);
        assert_eq!(fixture.calls(), 1);
        assert_eq!(prepared.stats.rendered, 1);
    }

    #[tokio::test]
    async fn test_duplicate_blocks_both_resolve() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(DiagramsConfig::default());
        let source = "```tikz\ncircle\n```\n\ntext\n\n```tikz\ncircle\n```\n";

        let prepared = pipeline.prepare(source, true).await;
        let page = PageContext {
            has_diagrams: true,
            aggregates_diagrams: false,
        };
        let html = pipeline.finish(diagram_page(&prepared.content), page);

        assert_eq!(fixture.calls(), 1);
        assert_eq!(html.matches(SVG).count(), 2);
    }

    #[tokio::test]
    async fn test_second_run_uses_cache() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(DiagramsConfig::default());
        let source = "```tikz-scale\ncircle\n```\n";

        let first = pipeline.prepare(source, true).await;
        let second = pipeline.prepare(source, true).await;

        assert_eq!(fixture.calls(), 1);
        assert_eq!(second.stats.cached, 1);
        assert_eq!(first.content, second.content);

        let page = PageContext {
            has_diagrams: true,
            aggregates_diagrams: false,
        };
        assert_eq!(
            pipeline.finish(first.content.clone(), page),
            pipeline.finish(second.content, page)
        );
    }

    #[tokio::test]
    async fn test_config_change_rerenders() {
        let fixture = Fixture::new();
        let source = "```tikz\ncircle\n```\n";

        fixture
            .pipeline(DiagramsConfig::default())
            .prepare(source, true)
            .await;
        fixture
            .pipeline(DiagramsConfig {
                scale: 2.0,
                ..DiagramsConfig::default()
            })
            .prepare(source, true)
            .await;

        assert_eq!(fixture.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_render_drops_marker_and_keeps_other_diagrams() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(DiagramsConfig::default());
        let source = "```tikz\nfail here\n```\n\n```tikz\nworks\n```\n";

        let prepared = pipeline.prepare(source, true).await;

        assert_eq!(prepared.stats.failed, 1);
        assert_eq!(prepared.stats.rendered, 1);
        assert!(fixture.cache.get(prepared.diagrams[0].hash.as_str()).is_none());

        let page = PageContext {
            has_diagrams: true,
            aggregates_diagrams: false,
        };
        let html = pipeline.finish(diagram_page(&prepared.content), page);
        assert_eq!(html.matches("<svg").count(), 1);
        assert!(!html.contains("placeholder"));
    }

    #[tokio::test]
    async fn test_failed_render_attempted_once_per_document() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(DiagramsConfig::default());
        let source = "```tikz\nfail\n```\n```tikz-mask\nfail\n```\n";

        let prepared = pipeline.prepare(source, true).await;

        assert_eq!(fixture.calls(), 1);
        assert_eq!(prepared.stats.failed, 1);
    }

    #[tokio::test]
    async fn test_not_opted_in_is_untouched() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(DiagramsConfig::default());
        let source = "```tikz\ncircle\n```\n";

        let prepared = pipeline.prepare(source, false).await;

        assert_eq!(prepared.content, source);
        assert!(!prepared.has_diagrams());
        assert_eq!(fixture.calls(), 0);
    }

    #[tokio::test]
    async fn test_every_page_processes_without_opt_in() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(DiagramsConfig {
            every_page: true,
            ..DiagramsConfig::default()
        });

        let prepared = pipeline.prepare("```tikz\ncircle\n```\n", false).await;

        assert!(prepared.has_diagrams());
        assert_eq!(fixture.calls(), 1);
    }

    #[tokio::test]
    async fn test_masked_scaled_block_end_to_end() {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(DiagramsConfig::default());

        let prepared = pipeline
            .prepare("```tikz-mask-scale=2\ncircle\n```\n", true)
            .await;
        let hash = prepared.diagrams[0].hash.clone();
        let page = PageContext {
            has_diagrams: true,
            aggregates_diagrams: false,
        };
        let html = pipeline.finish(diagram_page(&prepared.content), page);

        assert!(html.contains(r#"<svg width="20.000" height="40.000" viewBox="0 0 10 20">"#));
        assert!(html.contains(&format!(r#"<mask id="opacity-mask-{hash}">"#)));
        assert!(html.contains(r#"fill="var(--text-color)""#));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_documents_share_one_queue() {
        let fixture = Fixture::new();
        let pipeline = Arc::new(fixture.pipeline(DiagramsConfig::default()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    pipeline
                        .prepare(&format!("```tikz\ndiagram {i}\n```\n"), true)
                        .await
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().stats.rendered, 1);
        }

        assert_eq!(fixture.calls(), 8);
        assert_eq!(fixture.renderer.peak.load(Ordering::SeqCst), 1);
        fixture.queue.drain().await;
    }
}

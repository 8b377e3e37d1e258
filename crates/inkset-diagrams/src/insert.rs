//! Late pass: substitute cached SVGs for placeholder markers in rendered HTML.

use inkset_cache::{CacheBucket, CacheBucketExt};
use inkset_config::DiagramsConfig;

use crate::placeholder::{Placeholder, PlaceholderPattern};
use crate::svg;

/// What the host knows about the page being finished.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageContext {
    /// The page's own source contained diagram blocks.
    pub has_diagrams: bool,
    /// The page aggregates other documents (index, archive) and at least one
    /// of them has diagrams.
    pub aggregates_diagrams: bool,
}

/// Replaces markers with post-processed SVGs and injects the diagram styles.
#[derive(Debug)]
pub struct Inserter {
    config: DiagramsConfig,
    pattern: PlaceholderPattern,
    head: String,
}

impl Inserter {
    #[must_use]
    pub fn new(config: &DiagramsConfig) -> Self {
        let mut head = format!(
            r#"<link rel="stylesheet" type="text/css" href="{}" />"#,
            config.font_css_url
        );
        if !config.inline_style.is_empty() {
            head.push_str(&format!("<style>{}</style>", config.inline_style));
        }

        Self {
            config: config.clone(),
            pattern: PlaceholderPattern::new(&config.tag),
            head,
        }
    }

    /// Whether the late pass should touch this page at all.
    #[must_use]
    pub fn applies_to(&self, page: PageContext) -> bool {
        page.has_diagrams || page.aggregates_diagrams || self.config.every_page
    }

    /// Finish a rendered page.
    ///
    /// Returns `None` when the page is not eligible and must be left as is.
    /// Markers whose hash is not cached (the render failed) are removed.
    #[must_use]
    pub fn insert(&self, html: &str, page: PageContext, cache: &dyn CacheBucket) -> Option<String> {
        if !self.applies_to(page) {
            return None;
        }

        let html = self.inject_head(html);
        let html = self
            .pattern
            .replace_all(&html, |marker| self.resolve(marker, cache));
        Some(html)
    }

    fn inject_head(&self, html: &str) -> String {
        if html.contains(&self.head) {
            return html.to_owned();
        }
        match html.find("</head>") {
            Some(pos) => format!("{}{}{}", &html[..pos], self.head, &html[pos..]),
            None => html.to_owned(),
        }
    }

    fn resolve(&self, marker: &Placeholder, cache: &dyn CacheBucket) -> String {
        let hash = marker.hash.as_str();
        let Some(mut svg) = cache.get_string(hash) else {
            tracing::debug!(hash, "no cached render, dropping placeholder");
            return String::new();
        };

        if marker.flags.mask {
            svg = svg::masked_invert(&svg, hash);
        }
        if let Some(factor) = marker.flags.scale_factor(self.config.scale) {
            svg = svg::rescale(&svg, factor);
        }

        format!(r#"<p><span class="{}">{svg}</span></p>"#, self.config.tag)
    }
}

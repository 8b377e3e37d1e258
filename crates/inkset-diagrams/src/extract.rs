//! Diagram block extraction from raw document source.
//!
//! Blocks use a fenced grammar with optional modifiers after the tag:
//!
//! ````text
//! ```tikz[-mask|-color][-scale[=1.25]]
//! \begin{tikzpicture} ... \end{tikzpicture}
//! ```
//! ````
//!
//! Each block is replaced by its [`Placeholder`] in the rewritten source.

use regex::{Captures, Regex};

use crate::cache::ContentHash;
use crate::placeholder::Placeholder;

/// Scale modifier of a diagram block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleFlag {
    /// Bare `-scale`: use the configured default scale.
    Default,
    /// `-scale=<factor>`.
    Factor(f64),
}

/// Variant flags parsed from a block's modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiagramFlags {
    /// Redraw with the page text color (`-mask` or `-color`).
    pub mask: bool,
    /// Resize the rendered SVG.
    pub scale: Option<ScaleFlag>,
}

impl DiagramFlags {
    /// Resolve the effective scale factor, if any.
    #[must_use]
    pub fn scale_factor(&self, default_scale: f64) -> Option<f64> {
        match self.scale? {
            ScaleFlag::Default => Some(default_scale),
            ScaleFlag::Factor(factor) => Some(factor),
        }
    }
}

/// A diagram block as written in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBlock {
    /// Text between the opening line and the closing fence.
    pub body: String,
    pub flags: DiagramFlags,
}

/// A block together with its cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedBlock {
    pub block: SourceBlock,
    pub hash: ContentHash,
}

/// Result of [`Extractor::extract`].
#[derive(Debug, Default)]
pub struct Extraction {
    /// Blocks in document order. Identical blocks appear once per occurrence.
    pub blocks: Vec<ExtractedBlock>,
    /// Source with every extracted block replaced by its marker.
    pub content: String,
}

/// Finds diagram blocks for one fence tag.
#[derive(Debug)]
pub struct Extractor {
    tag: String,
    pattern: Regex,
}

impl Extractor {
    /// Build an extractor for blocks fenced as ```` ```{tag} ````.
    #[must_use]
    pub fn new(tag: &str) -> Self {
        let pattern = format!(
            r"```{}(-mask|-color)?(-scale(?:=([0-9.]+))?)?\r?\n([\s\S]+?)```",
            regex::escape(tag)
        );
        Self {
            tag: tag.to_owned(),
            pattern: Regex::new(&pattern).expect("escaped tag yields a valid pattern"),
        }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Extract all blocks, hashing each body with `hash`.
    ///
    /// Blocks whose body is blank are left in the source untouched.
    pub fn extract(&self, source: &str, hash: impl Fn(&str) -> ContentHash) -> Extraction {
        let mut blocks = Vec::new();
        let mut content = String::with_capacity(source.len());
        let mut last = 0;

        for caps in self.pattern.captures_iter(source) {
            let whole = caps.get(0).expect("group 0 always matches");
            let body = &caps[4];
            if body.trim().is_empty() {
                continue;
            }

            let block = SourceBlock {
                body: body.to_owned(),
                flags: parse_flags(&caps),
            };
            let hash = hash(body);
            let marker = Placeholder {
                flags: block.flags,
                hash: hash.clone(),
            };

            content.push_str(&source[last..whole.start()]);
            content.push_str(&marker.render(&self.tag));
            last = whole.end();

            blocks.push(ExtractedBlock { block, hash });
        }
        content.push_str(&source[last..]);

        Extraction { blocks, content }
    }
}

fn parse_flags(caps: &Captures<'_>) -> DiagramFlags {
    let mask = caps.get(1).is_some();
    let scale = caps.get(2).map(|_| match caps.get(3) {
        None => ScaleFlag::Default,
        Some(raw) => parse_factor(raw.as_str()),
    });
    DiagramFlags { mask, scale }
}

fn parse_factor(raw: &str) -> ScaleFlag {
    match raw.parse::<f64>() {
        Ok(factor) if factor.is_finite() && factor > 0.0 => ScaleFlag::Factor(factor),
        _ => {
            tracing::warn!(factor = raw, "invalid scale factor, using configured scale");
            ScaleFlag::Default
        }
    }
}

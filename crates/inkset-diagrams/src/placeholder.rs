//! Placeholder markers carried from the extraction pass to the insertion pass.
//!
//! A marker is an HTML comment, so markdown renderers copy it to their output
//! unchanged:
//!
//! ```text
//! <!-- tikz-mask-scale=2-placeholder-9f86d081... -->
//! ```

use regex::{Captures, Regex};

use crate::cache::ContentHash;
use crate::extract::{DiagramFlags, ScaleFlag};

/// Marker standing in for one diagram block.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub flags: DiagramFlags,
    pub hash: ContentHash,
}

impl Placeholder {
    /// Format the marker for blocks fenced with `tag`.
    #[must_use]
    pub fn render(&self, tag: &str) -> String {
        let mask = if self.flags.mask { "-mask" } else { "" };
        let scale = match self.flags.scale {
            None => String::new(),
            Some(ScaleFlag::Default) => "-scale".to_owned(),
            Some(ScaleFlag::Factor(factor)) => format!("-scale={factor}"),
        };
        format!("<!-- {tag}{mask}{scale}-placeholder-{} -->", self.hash)
    }
}

/// Locates markers for one fence tag in rendered output.
#[derive(Debug)]
pub struct PlaceholderPattern {
    pattern: Regex,
}

impl PlaceholderPattern {
    #[must_use]
    pub fn new(tag: &str) -> Self {
        let pattern = format!(
            r"<!-- {}(-mask|-color)?(-scale(?:=([0-9.]+))?)?-placeholder-([0-9a-f]+) -->",
            regex::escape(tag)
        );
        Self {
            pattern: Regex::new(&pattern).expect("escaped tag yields a valid pattern"),
        }
    }

    /// Parse every marker in `text`, in order of appearance.
    pub fn find_all(&self, text: &str) -> Vec<Placeholder> {
        self.pattern.captures_iter(text).map(|c| parse(&c)).collect()
    }

    /// Replace every marker with the string produced by `resolve`.
    ///
    /// Markers are resolved one at a time, in order of appearance.
    pub fn replace_all(&self, text: &str, mut resolve: impl FnMut(&Placeholder) -> String) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures<'_>| resolve(&parse(caps)))
            .into_owned()
    }
}

fn parse(caps: &Captures<'_>) -> Placeholder {
    let scale = caps.get(2).map(|_| {
        caps.get(3)
            .and_then(|raw| raw.as_str().parse::<f64>().ok())
            .filter(|factor| factor.is_finite() && *factor > 0.0)
            .map_or(ScaleFlag::Default, ScaleFlag::Factor)
    });
    Placeholder {
        flags: DiagramFlags {
            mask: caps.get(1).is_some(),
            scale,
        },
        hash: ContentHash::from_hex(&caps[4]),
    }
}

//! Text-level SVG post-processing applied at insertion time.
//!
//! Both transforms locate the root `<svg ...>` opening tag with a regular
//! expression and only rewrite attributes inside it, so nested elements with
//! their own `width`/`height` are never touched. Anything the patterns cannot
//! find is logged and the input is returned unchanged.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Root element opening tag.
static ROOT_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<svg\b[^>]*>").unwrap());

/// `width`/`height` attribute with a plain numeric value (optional `px`).
static DIMENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\s)(width|height)=["']([0-9]*\.?[0-9]+)(?:px)?["']"#).unwrap()
});

/// `viewBox="minX minY width height"`, separated by spaces and/or commas.
static VIEWBOX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\sviewBox=["'](-?[0-9.]+)[\s,]+(-?[0-9.]+)[\s,]+([0-9.]+)[\s,]+([0-9.]+)["']"#,
    )
    .unwrap()
});

/// Color matrix that inverts RGB and keeps alpha.
const INVERT_MATRIX: &str = "-1 0 0 0 1  0 -1 0 0 1  0 0 -1 0 1  0 0 0 1 0";

/// Multiply the root element's `width` and `height` by `factor`.
///
/// Values are written with three decimals. `viewBox` is left untouched, so the
/// drawing keeps its coordinate system and only its display size changes.
#[must_use]
pub fn rescale(svg: &str, factor: f64) -> String {
    let Some(root) = ROOT_TAG_RE.find(svg) else {
        tracing::error!("could not find <svg> root element to rescale");
        return svg.to_owned();
    };
    if !DIMENSION_RE.is_match(root.as_str()) {
        tracing::error!("could not find width or height attribute in SVG root element");
        return svg.to_owned();
    }

    let scaled = DIMENSION_RE.replace_all(root.as_str(), |caps: &Captures<'_>| {
        match caps[3].parse::<f64>() {
            Ok(value) => format!(r#"{}{}="{:.3}""#, &caps[1], &caps[2], value * factor),
            Err(_) => caps[0].to_owned(),
        }
    });

    format!("{}{}{}", &svg[..root.start()], scaled, &svg[root.end()..])
}

/// Integer rectangle covering a `viewBox`, padded against rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MaskRect {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
}

/// Largest `viewBox` coordinate the mask rect is computed for.
const MAX_COORDINATE: f64 = 1e15;

impl MaskRect {
    /// Returns `None` for non-finite or out-of-range values.
    #[allow(clippy::cast_possible_truncation)]
    fn from_view_box(min_x: f64, min_y: f64, width: f64, height: f64) -> Option<Self> {
        let in_range = |v: f64| v.is_finite() && v.abs() <= MAX_COORDINATE;
        if ![min_x, min_y, width, height].into_iter().all(in_range) {
            return None;
        }
        Some(Self {
            x: min_x.floor() as i64,
            y: min_y.floor() as i64,
            width: (width.ceil() as i64).saturating_add(1),
            height: (height.ceil() as i64).saturating_add(1),
        })
    }

    fn to_rect(self, attrs: &str) -> String {
        format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" {attrs}/>"#,
            self.x, self.y, self.width, self.height
        )
    }
}

/// Redraw the diagram in the page's text color.
///
/// The original drawing moves into a mask (through an inverting filter, so dark
/// ink becomes opaque and the white background transparent). A rect filled with
/// `var(--text-color)` is then painted through that mask. Element ids are keyed
/// by `hash` so several diagrams can share one document.
#[must_use]
pub fn masked_invert(svg: &str, hash: &str) -> String {
    let Some(root) = ROOT_TAG_RE.find(svg) else {
        tracing::error!(hash, "could not find <svg> root element to mask");
        return svg.to_owned();
    };
    let Some(rect) = VIEWBOX_RE.captures(root.as_str()).and_then(|c| parse_view_box(&c)) else {
        tracing::error!(hash, "could not find a usable viewBox attribute in SVG root element");
        return svg.to_owned();
    };
    if root.as_str().ends_with("/>") {
        tracing::error!(hash, "SVG root element has no content to mask");
        return svg.to_owned();
    }

    let close = svg
        .rfind("</svg>")
        .filter(|&end| end >= root.end())
        .unwrap_or(svg.len());
    let content = svg[root.end()..close].trim();

    let filter_id = format!("invert-{hash}");
    let mask_id = format!("opacity-mask-{hash}");

    format!(
        concat!(
            "{open}<defs>",
            r#"<filter id="{filter_id}"><feColorMatrix in="SourceGraphic" type="matrix" values="{matrix}"/></filter>"#,
            r#"<mask id="{mask_id}"><g filter="url(#{filter_id})">{background}{content}</g></mask>"#,
            "</defs>{ink}</svg>",
        ),
        open = root.as_str(),
        filter_id = filter_id,
        matrix = INVERT_MATRIX,
        mask_id = mask_id,
        background = rect.to_rect(r#"fill="white""#),
        content = content,
        ink = rect.to_rect(&format!(
            r#"fill="var(--text-color)" mask="url(#{mask_id})""#
        )),
    )
}

fn parse_view_box(caps: &Captures<'_>) -> Option<MaskRect> {
    let value = |i: usize| caps[i].parse::<f64>().ok();
    MaskRect::from_view_box(value(1)?, value(2)?, value(3)?, value(4)?)
}

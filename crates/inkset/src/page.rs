//! Markdown source pages: front matter, rendering and the HTML shell.

use pulldown_cmark::{Options, Parser, html};
use serde::Deserialize;

/// Page settings from the YAML front matter.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct FrontMatter {
    /// Document title (defaults to the file stem).
    pub title: Option<String>,
    /// Opt the page into diagram processing.
    pub diagrams: bool,
}

/// A markdown document split into front matter and body.
#[derive(Debug)]
pub(crate) struct SourcePage<'a> {
    pub meta: FrontMatter,
    pub body: &'a str,
}

impl<'a> SourcePage<'a> {
    /// Split off and parse a leading `---` front matter block.
    ///
    /// # Errors
    ///
    /// Returns an error if the front matter is not valid YAML.
    pub(crate) fn parse(content: &'a str) -> Result<Self, serde_yaml::Error> {
        let Some((front, body)) = split_front_matter(content) else {
            return Ok(Self {
                meta: FrontMatter::default(),
                body: content,
            });
        };

        let meta = if front.trim().is_empty() {
            FrontMatter::default()
        } else {
            serde_yaml::from_str(front)?
        };
        Ok(Self { meta, body })
    }
}

fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;
    if let Some(body) = rest.strip_prefix("---") {
        return Some(("", body.trim_start_matches(['\r', '\n'])));
    }
    let end = rest.find("\n---")?;
    let body = rest[end + 4..].trim_start_matches(['\r', '\n']);
    Some((&rest[..end], body))
}

/// Render markdown to an HTML fragment.
///
/// HTML comments, including diagram placeholders, pass through unchanged.
pub(crate) fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Wrap an HTML fragment in a minimal standalone document.
pub(crate) fn html_document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\" />\n<title>{}</title>\n</head>\n<body>\n{body}</body>\n</html>\n",
        escape_html(title)
    )
}

fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

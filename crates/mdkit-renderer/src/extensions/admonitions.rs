//! Admonition blocks.
//!
//! ```text
//! :::warning Optional title
//! Body, parsed as markdown.
//! :::
//! ```
//!
//! Admonitions nest. An opening line without a matching `:::` is left to
//! the backend as ordinary text, and `:::` lines inside fenced code never
//! open or close a block.

use std::sync::Arc;

use mdkit_plugin::Settings;
use serde_json::Value;

use crate::capability::{BlockMatch, BlockParser, BlockRenderer, Capability, Extension};
use crate::fence::{FenceTracker, LineKind};
use crate::html::{RenderContext, escape_html};
use crate::node::Node;

/// Node kind produced by [`Admonitions`].
const ADMONITION: &str = "admonition";

/// Types recognized when the `types` setting is absent.
const DEFAULT_TYPES: &[&str] = &["note", "tip", "info", "warning", "danger"];

/// `:::type` container blocks.
#[derive(Debug, Clone)]
pub struct Admonitions {
    types: Vec<String>,
}

impl Admonitions {
    /// Create the extension with its instance settings (`types`).
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let types = match settings.get("types") {
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect(),
            _ => DEFAULT_TYPES.iter().map(|t| (*t).to_owned()).collect(),
        };
        Self { types }
    }
}

/// Type name and title of an opening line.
fn opening(line: &str) -> Option<(&str, &str)> {
    let body = line.trim_start_matches(' ');
    if line.len() - body.len() > 3 {
        return None;
    }
    let rest = body.strip_prefix(":::")?;
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    Some((&rest[..end], rest[end..].trim()))
}

/// Index of the line closing the block whose body starts at `lines[0]`.
fn closing(lines: &[&str]) -> Option<usize> {
    let mut fences = FenceTracker::new();
    let mut depth = 0usize;
    for (index, line) in lines.iter().enumerate() {
        if fences.observe(line) != LineKind::Text {
            continue;
        }
        if line.trim() == ":::" {
            if depth == 0 {
                return Some(index);
            }
            depth -= 1;
        } else if opening(line).is_some() {
            depth += 1;
        }
    }
    None
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl BlockParser for Admonitions {
    fn parse(&self, lines: &[&str]) -> Option<BlockMatch> {
        let (name, title) = opening(lines.first()?)?;
        if !self.types.iter().any(|t| t == name) {
            return None;
        }
        let close = closing(&lines[1..])? + 1;
        let title = if title.is_empty() {
            capitalize(name)
        } else {
            title.to_owned()
        };

        Some(BlockMatch {
            consumed: close + 1,
            node: Node::block(ADMONITION)
                .with_data("type", name)
                .with_data("title", title),
            body: Some(lines[1..close].join("\n")),
        })
    }
}

impl BlockRenderer for Admonitions {
    fn node_kind(&self) -> &str {
        ADMONITION
    }

    fn render(&self, node: &Node, context: &RenderContext<'_>) -> String {
        format!(
            r#"<div class="admonition admonition-{}"><p class="admonition-title">{}</p>{}</div>"#,
            escape_html(node.data("type").unwrap_or("note")),
            escape_html(node.data("title").unwrap_or_default()),
            context.render_children(node)
        )
    }
}

impl Extension for Admonitions {
    fn capabilities(&self) -> &[Capability] {
        &[Capability::BlockParser, Capability::BlockRenderer]
    }

    fn as_block_parser(self: Arc<Self>) -> Option<Arc<dyn BlockParser>> {
        Some(self)
    }

    fn as_block_renderer(self: Arc<Self>) -> Option<Arc<dyn BlockRenderer>> {
        Some(self)
    }
}

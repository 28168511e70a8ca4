//! Trailing attribute lists.
//!
//! A paragraph or heading ending in `{#id .class key=value}` gets those
//! attributes on its element and loses the list from its text. Braces that do
//! not parse as an attribute list are left alone.

use std::sync::Arc;

use mdkit_plugin::Settings;

use super::bool_setting;
use crate::capability::{Capability, DocumentProcessor, EnvironmentAware, Extension};
use crate::environment::EnvironmentBuilder;
use crate::node::{Node, kind};

/// Registers an [`AttributeProcessor`] into the environment.
#[derive(Debug, Clone, Copy)]
pub struct Attributes {
    processor: AttributeProcessor,
}

impl Attributes {
    /// Create the extension with its instance settings (`headings`,
    /// `paragraphs`).
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            processor: AttributeProcessor {
                headings: bool_setting(settings, "headings", true),
                paragraphs: bool_setting(settings, "paragraphs", true),
            },
        }
    }
}

impl EnvironmentAware for Attributes {
    fn register(&self, environment: &mut EnvironmentBuilder) {
        environment.add_extension(Arc::new(self.processor));
    }
}

impl Extension for Attributes {
    fn capabilities(&self) -> &[Capability] {
        &[Capability::EnvironmentAware]
    }

    fn as_environment_aware(self: Arc<Self>) -> Option<Arc<dyn EnvironmentAware>> {
        Some(self)
    }
}

/// Moves trailing attribute lists onto their block.
#[derive(Debug, Clone, Copy)]
pub struct AttributeProcessor {
    headings: bool,
    paragraphs: bool,
}

impl Default for AttributeProcessor {
    fn default() -> Self {
        Self {
            headings: true,
            paragraphs: true,
        }
    }
}

impl AttributeProcessor {
    fn applies_to(self, node: &Node) -> bool {
        (self.headings && node.is(kind::HEADING)) || (self.paragraphs && node.is(kind::PARAGRAPH))
    }
}

impl DocumentProcessor for AttributeProcessor {
    fn process(&self, document: &mut Node, _config: &Settings) {
        document.walk_mut(&mut |node| {
            if self.applies_to(node) {
                apply(node);
            }
        });
    }
}

impl Extension for AttributeProcessor {
    fn capabilities(&self) -> &[Capability] {
        &[Capability::DocumentProcessor]
    }

    fn as_document_processor(self: Arc<Self>) -> Option<Arc<dyn DocumentProcessor>> {
        Some(self)
    }
}

fn apply(node: &mut Node) {
    let Some(last) = node.children.last_mut() else {
        return;
    };
    if !last.is(kind::TEXT) {
        return;
    }
    let Some((text, attributes)) = last.literal.as_deref().and_then(trailing_attributes) else {
        return;
    };

    if text.is_empty() {
        node.children.pop();
    } else {
        last.literal = Some(text);
    }
    for (name, value) in attributes {
        if name == "class"
            && let Some(existing) = node.attributes.get_mut("class")
        {
            existing.push(' ');
            existing.push_str(&value);
        } else {
            node.attributes.insert(name, value);
        }
    }
}

/// Split `text {attrs}` into the remaining text and the parsed attributes.
fn trailing_attributes(text: &str) -> Option<(String, Vec<(String, String)>)> {
    let trimmed = text.trim_end();
    let inner = trimmed.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    let attributes = parse_attributes(&inner[open + 1..])?;
    Some((inner[..open].trim_end().to_owned(), attributes))
}

/// Parse `#id .class key=value key="quoted value"`.
///
/// Returns `None` for an empty list or any token that is not an attribute.
fn parse_attributes(list: &str) -> Option<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    let mut classes: Vec<&str> = Vec::new();
    let mut remaining = list.trim();

    while !remaining.is_empty() {
        let end = |s: &str| s.find(char::is_whitespace).unwrap_or(s.len());
        if let Some(rest) = remaining.strip_prefix('#') {
            let id = &rest[..end(rest)];
            if id.is_empty() {
                return None;
            }
            attributes.push(("id".to_owned(), id.to_owned()));
            remaining = &rest[id.len()..];
        } else if let Some(rest) = remaining.strip_prefix('.') {
            let class = &rest[..end(rest)];
            if class.is_empty() {
                return None;
            }
            classes.push(class);
            remaining = &rest[class.len()..];
        } else {
            let (key, value, rest) = parse_key_value(remaining)?;
            attributes.push((key.to_owned(), value.to_owned()));
            remaining = rest;
        }
        remaining = remaining.trim_start();
    }

    if !classes.is_empty() {
        attributes.push(("class".to_owned(), classes.join(" ")));
    }
    (!attributes.is_empty()).then_some(attributes)
}

/// Parse `key=value`, `key="value"` or `key='value'`.
fn parse_key_value(input: &str) -> Option<(&str, &str, &str)> {
    let eq = input.find('=')?;
    let key = &input[..eq];
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return None;
    }
    let after = &input[eq + 1..];
    match after.chars().next()? {
        quote @ ('"' | '\'') => {
            let close = after[1..].find(quote)? + 1;
            Some((key, &after[1..close], &after[close + 1..]))
        }
        _ => {
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            if end == 0 {
                return None;
            }
            Some((key, &after[..end], &after[end..]))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::backend::CommonMarkBackend;
    use crate::convert::convert;
    use crate::environment::{Attachment, Environment};

    fn environment() -> Environment {
        let mut builder = EnvironmentBuilder::new(
            "commonmark",
            Arc::new(CommonMarkBackend::new("commonmark")),
            Settings::new(),
        );
        builder
            .attach("attributes", Arc::new(Attributes::new(&Settings::new())))
            .unwrap();
        builder.build()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_parse_attributes() {
        assert_eq!(
            parse_attributes(r#"#intro .lead .wide data-x="a b" lang=en"#),
            Some(pairs(&[
                ("id", "intro"),
                ("data-x", "a b"),
                ("lang", "en"),
                ("class", "lead wide"),
            ]))
        );
        assert_eq!(parse_attributes(""), None);
        assert_eq!(parse_attributes("not attributes"), None);
        assert_eq!(parse_attributes("key="), None);
    }

    #[test]
    fn test_sub_extension_attributed_to_owner() {
        let environment = environment();

        assert_eq!(environment.extensions(), ["attributes".to_owned()]);
        assert_eq!(
            environment.attachments(),
            [
                Attachment {
                    extension: "attributes".to_owned(),
                    capability: Capability::DocumentProcessor,
                },
                Attachment {
                    extension: "attributes".to_owned(),
                    capability: Capability::EnvironmentAware,
                },
            ]
        );
    }

    #[test]
    fn test_applies_to_paragraphs_and_headings() {
        let html = convert("# Title {#top}\n\nSome text {.lead}\n\nA {set} of braces", &environment()).unwrap();

        assert_eq!(
            html,
            r#"<h1 id="top">Title</h1><p class="lead">Some text</p><p>A {set} of braces</p>"#
        );
    }
}

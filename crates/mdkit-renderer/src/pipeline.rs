//! Conversion pipeline shared by all backends.
//!
//! 1. Block parsers claim source lines outside fenced code; each claimed
//!    range becomes a placeholder comment the backend passes through as raw
//!    HTML. The comment's tag is salted per conversion so text in the source
//!    can never be taken for a placeholder.
//! 2. The backend parses the remaining text. Placeholders are swapped for
//!    the claimed nodes, whose bodies are parsed recursively.
//! 3. Inline parsers split text nodes.
//! 4. Document processors, then inline processors, rewrite the tree.
//! 5. The tree is rendered with the environment's renderers.

use std::fmt::Write;
use std::sync::Arc;

use crate::backend::BackendError;
use crate::capability::{BlockMatch, BlockParser, InlineParser};
use crate::environment::Environment;
use crate::fence::{FenceTracker, LineKind};
use crate::html::RenderContext;
use crate::node::{Node, kind};
use crate::sanitize;

const PLACEHOLDER_TAG: &str = "mdkitblock";
const PLACEHOLDER_CLOSE: &str = "-->";

/// Bodies of claimed blocks may nest this deep.
const MAX_DEPTH: usize = 16;

/// Parse function supplied by the backend.
pub(crate) type ParseFn<'a> = dyn Fn(&str) -> Result<Node, BackendError> + 'a;

/// Run the full pipeline for `text`.
pub(crate) fn run(
    environment: &Environment,
    text: &str,
    parse: &ParseFn<'_>,
) -> Result<String, BackendError> {
    let mut document = parse_tree(environment, text, parse, 0)?;

    if !environment.inline_parsers().is_empty() {
        parse_inlines(environment.inline_parsers(), &mut document);
    }
    for processor in environment.document_processors() {
        processor.process(&mut document, environment.config());
    }
    if !environment.inline_processors().is_empty() {
        process_inlines(environment, &mut document);
    }

    Ok(RenderContext::new(environment).render(&document))
}

fn parse_tree(
    environment: &Environment,
    text: &str,
    parse: &ParseFn<'_>,
    depth: usize,
) -> Result<Node, BackendError> {
    if environment.block_parsers().is_empty() || depth > MAX_DEPTH {
        return parse(text);
    }

    let placeholder = Placeholder::for_source(text);
    let (source, blocks) = extract_blocks(environment.block_parsers(), text, &placeholder);
    let mut document = parse(&source)?;
    if blocks.is_empty() {
        return Ok(document);
    }

    let mut nodes = Vec::with_capacity(blocks.len());
    for block in blocks {
        let mut node = block.node;
        if let Some(body) = block.body {
            let inner = parse_tree(environment, &body, parse, depth + 1)?;
            node.children.extend(inner.children);
        }
        nodes.push(Some(node));
    }
    substitute(&mut document, &placeholder, &mut nodes);
    Ok(document)
}

/// Comment marker standing in for a claimed block.
#[derive(Debug)]
struct Placeholder {
    open: String,
}

impl Placeholder {
    /// Pick a tag whose letters and digits occur nowhere in `text`, even
    /// after entity decoding, so no literal the backend produces from the
    /// source can start with it.
    fn for_source(text: &str) -> Self {
        let letters: String = sanitize::decode_entities(text)
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        let salt = (0_u64..)
            .find(|salt| !letters.contains(&format!("{PLACEHOLDER_TAG}{salt}")))
            .unwrap_or_default();
        Self {
            open: format!("<!--{PLACEHOLDER_TAG}{salt}:"),
        }
    }

    fn write(&self, out: &mut String, index: usize) {
        // Blank lines around the comment make it an HTML block of its own.
        write!(out, "\n{}{index}{PLACEHOLDER_CLOSE}\n\n", self.open).unwrap();
    }

    fn index(&self, node: &Node) -> Option<usize> {
        let literal = match node.kind.as_str() {
            kind::HTML_BLOCK => node.literal.as_deref()?,
            // Backends without raw HTML support keep the comment as paragraph text.
            kind::PARAGRAPH => match node.children.as_slice() {
                [only] if only.is(kind::TEXT) || only.is(kind::HTML_INLINE) => {
                    only.literal.as_deref()?
                }
                _ => return None,
            },
            _ => return None,
        };
        literal
            .trim()
            .strip_prefix(self.open.as_str())?
            .strip_suffix(PLACEHOLDER_CLOSE)?
            .parse()
            .ok()
    }
}

/// Replace lines claimed by block parsers with placeholders.
fn extract_blocks(
    parsers: &[Arc<dyn BlockParser>],
    text: &str,
    placeholder: &Placeholder,
) -> (String, Vec<BlockMatch>) {
    let lines: Vec<&str> = text.lines().collect();
    let mut source = String::with_capacity(text.len());
    let mut blocks = Vec::new();
    let mut fences = FenceTracker::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        if fences.observe(line) == LineKind::Text
            && let Some(found) = parsers.iter().find_map(|p| p.parse(&lines[index..]))
        {
            let consumed = found.consumed.clamp(1, lines.len() - index);
            placeholder.write(&mut source, blocks.len());
            blocks.push(found);
            index += consumed;
            continue;
        }
        source.push_str(line);
        source.push('\n');
        index += 1;
    }

    (source, blocks)
}

fn substitute(node: &mut Node, placeholder: &Placeholder, blocks: &mut [Option<Node>]) {
    for child in &mut node.children {
        if let Some(index) = placeholder.index(child)
            && let Some(block) = blocks.get_mut(index).and_then(Option::take)
        {
            *child = block;
        } else {
            substitute(child, placeholder, blocks);
        }
    }
}

fn is_opaque(node: &Node) -> bool {
    matches!(
        node.kind.as_str(),
        kind::CODE | kind::CODE_BLOCK | kind::HTML_BLOCK | kind::HTML_INLINE
    )
}

fn parse_inlines(parsers: &[Arc<dyn InlineParser>], node: &mut Node) {
    if is_opaque(node) {
        return;
    }
    let children = std::mem::take(&mut node.children);
    let mut parsed = Vec::with_capacity(children.len());
    for mut child in children {
        if child.is(kind::TEXT)
            && let Some(literal) = child.literal.as_deref()
        {
            split_text(parsers, literal, &mut parsed);
            continue;
        }
        parse_inlines(parsers, &mut child);
        parsed.push(child);
    }
    node.children = parsed;
}

/// Split one text literal at inline parser matches.
fn split_text(parsers: &[Arc<dyn InlineParser>], text: &str, out: &mut Vec<Node>) {
    let mut plain = 0;
    let mut pos = 0;

    while let Some(c) = text[pos..].chars().next() {
        let rest = &text[pos..];
        let found = parsers
            .iter()
            .filter(|p| p.triggers().contains(&c))
            .find_map(|p| p.parse(rest))
            .filter(|m| m.consumed > 0 && m.consumed <= rest.len() && rest.is_char_boundary(m.consumed));

        match found {
            Some(found) => {
                if plain < pos {
                    out.push(Node::text(&text[plain..pos]));
                }
                out.push(found.node);
                pos += found.consumed;
                plain = pos;
            }
            None => pos += c.len_utf8(),
        }
    }

    if plain < text.len() {
        out.push(Node::text(&text[plain..]));
    }
}

fn process_inlines(environment: &Environment, node: &mut Node) {
    if is_opaque(node) {
        return;
    }
    if node.has_inline_children() {
        for processor in environment.inline_processors() {
            processor.process(&mut node.children, environment.config());
        }
    }
    for child in &mut node.children {
        process_inlines(environment, child);
    }
}

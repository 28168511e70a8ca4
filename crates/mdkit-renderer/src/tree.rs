//! pulldown-cmark event stream to [`Node`] tree.

use pulldown_cmark::{Alignment, BlockQuoteKind, CodeBlockKind, Event, HeadingLevel, Tag};

use crate::node::{Node, kind};

/// Build a document tree from parser events.
pub(crate) fn build<'a>(events: impl Iterator<Item = Event<'a>>) -> Node {
    let mut builder = TreeBuilder::new();
    for event in events {
        builder.event(event);
    }
    builder.finish()
}

struct TreeBuilder {
    stack: Vec<Node>,
    /// Column alignments of open tables and the next cell index.
    tables: Vec<(Vec<Alignment>, usize)>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            stack: vec![Node::document()],
            tables: Vec::new(),
        }
    }

    fn top(&mut self) -> &mut Node {
        // The document root is never popped.
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn push_child(&mut self, node: Node) {
        self.top().children.push(node);
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => {
                let node = self.start(tag);
                self.stack.push(node);
            }
            Event::End(_) => self.end(),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => self.push_child(Node::inline(kind::CODE).with_literal(&*code)),
            Event::InlineMath(math) | Event::DisplayMath(math) => {
                self.push_child(Node::inline(kind::CODE).with_literal(&*math));
            }
            Event::Html(html) => self.html(&html),
            Event::InlineHtml(html) => {
                self.push_child(Node::inline(kind::HTML_INLINE).with_literal(&*html));
            }
            Event::FootnoteReference(label) => {
                self.push_child(
                    Node::inline(kind::FOOTNOTE_REFERENCE).with_data("label", &*label),
                );
            }
            Event::SoftBreak => self.push_child(Node::inline(kind::SOFT_BREAK)),
            Event::HardBreak => self.push_child(Node::inline(kind::HARD_BREAK)),
            Event::Rule => self.push_child(Node::block(kind::THEMATIC_BREAK)),
            Event::TaskListMarker(checked) => {
                self.push_child(
                    Node::inline(kind::TASK_MARKER).with_data("checked", checked.to_string()),
                );
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>) -> Node {
        match tag {
            Tag::Paragraph => Node::block(kind::PARAGRAPH),
            Tag::Heading {
                level,
                id,
                classes,
                attrs,
            } => {
                let mut node =
                    Node::block(kind::HEADING).with_data("level", heading_level(level).to_string());
                if let Some(id) = id {
                    node = node.with_attribute("id", &*id);
                }
                if !classes.is_empty() {
                    let classes: Vec<&str> = classes.iter().map(std::ops::Deref::deref).collect();
                    node = node.with_attribute("class", classes.join(" "));
                }
                for (name, value) in attrs {
                    node = node.with_attribute(&*name, value.as_deref().unwrap_or_default());
                }
                node
            }
            Tag::BlockQuote(alert) => {
                let node = Node::block(kind::BLOCK_QUOTE);
                match alert {
                    Some(alert) => node.with_data("alert", alert_name(alert)),
                    None => node,
                }
            }
            Tag::CodeBlock(block) => {
                let node = Node::block(kind::CODE_BLOCK).with_literal("");
                match block {
                    CodeBlockKind::Fenced(info) => {
                        let lang = info.split_whitespace().next().unwrap_or_default();
                        if lang.is_empty() {
                            node
                        } else {
                            node.with_data("lang", lang).with_data("info", &*info)
                        }
                    }
                    CodeBlockKind::Indented => node,
                }
            }
            Tag::HtmlBlock => Node::block(kind::HTML_BLOCK).with_literal(""),
            Tag::List(start) => {
                let node = Node::block(kind::LIST);
                match start {
                    Some(start) => node.with_data("start", start.to_string()),
                    None => node,
                }
            }
            Tag::Item => Node::block(kind::ITEM),
            Tag::FootnoteDefinition(label) => {
                Node::block(kind::FOOTNOTE_DEFINITION).with_data("label", &*label)
            }
            Tag::DefinitionList => Node::block(kind::DEFINITION_LIST),
            Tag::DefinitionListTitle => Node::block(kind::DEFINITION_TITLE),
            Tag::DefinitionListDefinition => Node::block(kind::DEFINITION_DETAILS),
            Tag::Table(alignments) => {
                self.tables.push((alignments, 0));
                Node::block(kind::TABLE)
            }
            Tag::TableHead => {
                self.reset_column();
                Node::block(kind::TABLE_HEAD)
            }
            Tag::TableRow => {
                self.reset_column();
                Node::block(kind::TABLE_ROW)
            }
            Tag::TableCell => {
                let header = self.top().is(kind::TABLE_HEAD);
                let node = Node::block(kind::TABLE_CELL).with_data("header", header.to_string());
                match self.next_alignment() {
                    Some(align) => node.with_data("align", align),
                    None => node,
                }
            }
            Tag::Emphasis => Node::inline(kind::EMPHASIS),
            Tag::Strong => Node::inline(kind::STRONG),
            Tag::Strikethrough => Node::inline(kind::STRIKETHROUGH),
            Tag::Superscript => Node::inline(kind::SUPERSCRIPT),
            Tag::Subscript => Node::inline(kind::SUBSCRIPT),
            Tag::Link {
                dest_url, title, ..
            } => with_title(
                Node::inline(kind::LINK).with_data("href", &*dest_url),
                &title,
            ),
            Tag::Image {
                dest_url, title, ..
            } => with_title(
                Node::inline(kind::IMAGE).with_data("src", &*dest_url),
                &title,
            ),
            Tag::MetadataBlock(_) => Node::block("metadata"),
        }
    }

    fn end(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        let Some(node) = self.stack.pop() else {
            return;
        };
        match node.kind.as_str() {
            kind::TABLE => {
                self.tables.pop();
            }
            "metadata" => return,
            _ => {}
        }
        self.push_child(node);
    }

    fn text(&mut self, text: &str) {
        let top = self.top();
        if top.is(kind::CODE_BLOCK) || top.is(kind::HTML_BLOCK) || top.is("metadata") {
            top.literal.get_or_insert_with(String::new).push_str(text);
            return;
        }
        // Adjacent text events (split at entities or smart punctuation) are merged.
        if let Some(last) = top.children.last_mut()
            && last.is(kind::TEXT)
            && let Some(literal) = last.literal.as_mut()
        {
            literal.push_str(text);
            return;
        }
        top.children.push(Node::text(text));
    }

    fn html(&mut self, html: &str) {
        let top = self.top();
        if top.is(kind::HTML_BLOCK) {
            top.literal.get_or_insert_with(String::new).push_str(html);
        } else {
            top.children
                .push(Node::block(kind::HTML_BLOCK).with_literal(html));
        }
    }

    fn reset_column(&mut self) {
        if let Some((_, column)) = self.tables.last_mut() {
            *column = 0;
        }
    }

    fn next_alignment(&mut self) -> Option<&'static str> {
        let (alignments, column) = self.tables.last_mut()?;
        let alignment = alignments.get(*column).copied();
        *column += 1;
        match alignment? {
            Alignment::None => None,
            Alignment::Left => Some("left"),
            Alignment::Center => Some("center"),
            Alignment::Right => Some("right"),
        }
    }

    fn finish(mut self) -> Node {
        // Close anything left open by a truncated stream.
        while self.stack.len() > 1 {
            self.end();
        }
        self.stack.pop().unwrap_or_else(Node::document)
    }
}

fn with_title(node: Node, title: &str) -> Node {
    if title.is_empty() {
        node
    } else {
        node.with_data("title", title)
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn alert_name(alert: BlockQuoteKind) -> &'static str {
    match alert {
        BlockQuoteKind::Note => "note",
        BlockQuoteKind::Tip => "tip",
        BlockQuoteKind::Important => "important",
        BlockQuoteKind::Warning => "warning",
        BlockQuoteKind::Caution => "caution",
    }
}

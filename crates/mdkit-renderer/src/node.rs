//! Document tree shared by backends, extensions and the HTML renderer.
//!
//! Parser backends produce a [`Node`] tree; extensions rewrite it and
//! register renderers per node kind. Node kinds are plain strings so
//! extensions can introduce their own (see [`kind`] for the built-in ones).

use std::collections::BTreeMap;

/// Built-in node kinds.
pub mod kind {
    /// Root of a parsed document.
    pub const DOCUMENT: &str = "document";
    /// Paragraph.
    pub const PARAGRAPH: &str = "paragraph";
    /// Heading; `level` data holds 1-6.
    pub const HEADING: &str = "heading";
    /// Block quote; optional `alert` data (note, tip, ...).
    pub const BLOCK_QUOTE: &str = "block_quote";
    /// Fenced or indented code; literal holds the code, `lang` data the language.
    pub const CODE_BLOCK: &str = "code_block";
    /// Raw HTML block; literal holds the HTML.
    pub const HTML_BLOCK: &str = "html_block";
    /// Horizontal rule.
    pub const THEMATIC_BREAK: &str = "thematic_break";
    /// List; `start` data present for ordered lists.
    pub const LIST: &str = "list";
    /// List item.
    pub const ITEM: &str = "item";
    /// Table; children are head and rows.
    pub const TABLE: &str = "table";
    /// Table head row container.
    pub const TABLE_HEAD: &str = "table_head";
    /// Table body row.
    pub const TABLE_ROW: &str = "table_row";
    /// Table cell; `align` and `header` data.
    pub const TABLE_CELL: &str = "table_cell";
    /// Footnote definition; `label` data.
    pub const FOOTNOTE_DEFINITION: &str = "footnote_definition";
    /// Definition list.
    pub const DEFINITION_LIST: &str = "definition_list";
    /// Definition list term.
    pub const DEFINITION_TITLE: &str = "definition_title";
    /// Definition list description.
    pub const DEFINITION_DETAILS: &str = "definition_details";
    /// Plain text; literal holds the unescaped text.
    pub const TEXT: &str = "text";
    /// Inline code span.
    pub const CODE: &str = "code";
    /// Emphasis.
    pub const EMPHASIS: &str = "emphasis";
    /// Strong emphasis.
    pub const STRONG: &str = "strong";
    /// Strikethrough.
    pub const STRIKETHROUGH: &str = "strikethrough";
    /// Superscript.
    pub const SUPERSCRIPT: &str = "superscript";
    /// Subscript.
    pub const SUBSCRIPT: &str = "subscript";
    /// Link; `href` and optional `title` data.
    pub const LINK: &str = "link";
    /// Image; `src` and optional `title` data, children are the alt text.
    pub const IMAGE: &str = "image";
    /// Footnote reference; `label` data.
    pub const FOOTNOTE_REFERENCE: &str = "footnote_reference";
    /// Soft line break.
    pub const SOFT_BREAK: &str = "soft_break";
    /// Hard line break.
    pub const HARD_BREAK: &str = "hard_break";
    /// Raw inline HTML.
    pub const HTML_INLINE: &str = "html_inline";
    /// Task list checkbox; `checked` data.
    pub const TASK_MARKER: &str = "task_marker";
}

/// Whether a node is block- or inline-level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeLevel {
    /// Block-level container or leaf.
    Block,
    /// Inline content.
    Inline,
}

/// A node in the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Node kind (see [`kind`]).
    pub kind: String,
    /// Block or inline.
    pub level: NodeLevel,
    /// Kind-specific data (heading level, link target, ...).
    pub data: BTreeMap<String, String>,
    /// HTML attributes emitted on the rendered element.
    pub attributes: BTreeMap<String, String>,
    /// Literal content for leaves (text, code, raw HTML).
    pub literal: Option<String>,
    /// Child nodes.
    pub children: Vec<Node>,
}

impl Node {
    fn new(kind: impl Into<String>, level: NodeLevel) -> Self {
        Self {
            kind: kind.into(),
            level,
            data: BTreeMap::new(),
            attributes: BTreeMap::new(),
            literal: None,
            children: Vec::new(),
        }
    }

    /// Create a block node.
    pub fn block(kind: impl Into<String>) -> Self {
        Self::new(kind, NodeLevel::Block)
    }

    /// Create an inline node.
    pub fn inline(kind: impl Into<String>) -> Self {
        Self::new(kind, NodeLevel::Inline)
    }

    /// Create an empty document.
    #[must_use]
    pub fn document() -> Self {
        Self::block(kind::DOCUMENT)
    }

    /// Create a text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self::inline(kind::TEXT).with_literal(text)
    }

    /// Set the literal.
    #[must_use]
    pub fn with_literal(mut self, literal: impl Into<String>) -> Self {
        self.literal = Some(literal.into());
        self
    }

    /// Append a child.
    #[must_use]
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Append children.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    /// Set a data entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Set an HTML attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Whether the node has the given kind.
    #[must_use]
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Whether the node is block-level.
    #[must_use]
    pub fn is_block(&self) -> bool {
        self.level == NodeLevel::Block
    }

    /// Data value by key.
    #[must_use]
    pub fn data(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Concatenated text of all text and code descendants.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self.kind.as_str() {
            kind::TEXT | kind::CODE => {
                if let Some(literal) = &self.literal {
                    out.push_str(literal);
                }
            }
            kind::SOFT_BREAK | kind::HARD_BREAK => out.push(' '),
            _ => {
                for child in &self.children {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Whether any direct child is inline-level.
    #[must_use]
    pub fn has_inline_children(&self) -> bool {
        self.children.iter().any(|c| c.level == NodeLevel::Inline)
    }

    /// Visit this node and all descendants, parents first.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }

    /// Visit this node and all descendants, parents first.
    pub fn walk(&self, f: &mut impl FnMut(&Node)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

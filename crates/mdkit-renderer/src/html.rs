//! HTML rendering of document trees.
//!
//! Each node goes to the renderer an extension registered for its kind and
//! level, or to the built-in rendering below. Output follows the usual
//! `CommonMark` HTML shape (`<pre><code class="language-x">`, `<s>` for
//! strikethrough, `<ol start="n">`).

use std::fmt::Write;

use mdkit_plugin::Settings;

use crate::environment::Environment;
use crate::node::{Node, NodeLevel, kind};

/// Escape text for HTML content and attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Rendering state handed to extension renderers.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    environment: &'a Environment,
}

impl<'a> RenderContext<'a> {
    /// Create a context rendering with `environment`'s renderers.
    #[must_use]
    pub fn new(environment: &'a Environment) -> Self {
        Self { environment }
    }

    /// Environment configuration.
    #[must_use]
    pub fn config(&self) -> &'a Settings {
        self.environment.config()
    }

    /// Environment being rendered with.
    #[must_use]
    pub fn environment(&self) -> &'a Environment {
        self.environment
    }

    /// Render a node, dispatching to a registered renderer when present.
    #[must_use]
    pub fn render(&self, node: &Node) -> String {
        let mut out = String::new();
        self.render_into(node, &mut out);
        out
    }

    /// Render all children of a node.
    #[must_use]
    pub fn render_children(&self, node: &Node) -> String {
        let mut out = String::new();
        for child in &node.children {
            self.render_into(child, &mut out);
        }
        out
    }

    /// Render a node with the built-in renderer, ignoring registrations.
    ///
    /// Children still dispatch normally.
    #[must_use]
    pub fn render_default(&self, node: &Node) -> String {
        let mut out = String::new();
        self.default_into(node, &mut out);
        out
    }

    fn render_into(&self, node: &Node, out: &mut String) {
        let custom = match node.level {
            NodeLevel::Block => self
                .environment
                .block_renderer(&node.kind)
                .map(|renderer| renderer.render(node, self)),
            NodeLevel::Inline => self
                .environment
                .inline_renderer(&node.kind)
                .map(|renderer| renderer.render(node, self)),
        };
        match custom {
            Some(html) => out.push_str(&html),
            None => self.default_into(node, out),
        }
    }

    fn children_into(&self, node: &Node, out: &mut String) {
        for child in &node.children {
            self.render_into(child, out);
        }
    }

    /// Wrap children in `<tag attrs>...</tag>`.
    fn element(&self, tag: &str, node: &Node, out: &mut String) {
        write!(out, "<{tag}{}>", attributes(node)).unwrap();
        self.children_into(node, out);
        write!(out, "</{tag}>").unwrap();
    }

    #[allow(clippy::too_many_lines)]
    fn default_into(&self, node: &Node, out: &mut String) {
        match node.kind.as_str() {
            kind::DOCUMENT => self.children_into(node, out),
            kind::PARAGRAPH => self.element("p", node, out),
            kind::HEADING => {
                let level = node
                    .data("level")
                    .and_then(|level| level.parse::<u8>().ok())
                    .unwrap_or(1)
                    .clamp(1, 6);
                self.element(&format!("h{level}"), node, out);
            }
            kind::BLOCK_QUOTE => match node.data("alert") {
                Some(alert) => {
                    write!(
                        out,
                        r#"<div class="alert alert-{}"><p class="alert-title">{}</p>"#,
                        escape_html(alert),
                        escape_html(&alert_title(alert))
                    )
                    .unwrap();
                    self.children_into(node, out);
                    out.push_str("</div>");
                }
                None => self.element("blockquote", node, out),
            },
            kind::CODE_BLOCK => {
                let code = escape_html(node.literal.as_deref().unwrap_or_default());
                match node.data("lang") {
                    Some(lang) => write!(
                        out,
                        r#"<pre{}><code class="language-{}">{code}</code></pre>"#,
                        attributes(node),
                        escape_html(lang)
                    )
                    .unwrap(),
                    None => write!(out, "<pre{}><code>{code}</code></pre>", attributes(node))
                        .unwrap(),
                }
            }
            kind::HTML_BLOCK | kind::HTML_INLINE => {
                out.push_str(node.literal.as_deref().unwrap_or_default());
            }
            kind::THEMATIC_BREAK => out.push_str("<hr>"),
            kind::LIST => match node.data("start") {
                Some("1") => self.element("ol", node, out),
                Some(start) => {
                    write!(
                        out,
                        r#"<ol start="{}"{}>"#,
                        escape_html(start),
                        attributes(node)
                    )
                    .unwrap();
                    self.children_into(node, out);
                    out.push_str("</ol>");
                }
                None => self.element("ul", node, out),
            },
            kind::ITEM => self.element("li", node, out),
            kind::TABLE => {
                write!(out, "<table{}>", attributes(node)).unwrap();
                let (head, rows): (Vec<&Node>, Vec<&Node>) = node
                    .children
                    .iter()
                    .partition(|child| child.is(kind::TABLE_HEAD));
                for head in head {
                    out.push_str("<thead>");
                    write!(out, "<tr{}>", attributes(head)).unwrap();
                    self.children_into(head, out);
                    out.push_str("</tr></thead>");
                }
                out.push_str("<tbody>");
                for row in rows {
                    self.render_into(row, out);
                }
                out.push_str("</tbody></table>");
            }
            kind::TABLE_HEAD | kind::TABLE_ROW => self.element("tr", node, out),
            kind::TABLE_CELL => {
                let tag = if node.data("header") == Some("true") {
                    "th"
                } else {
                    "td"
                };
                out.push('<');
                out.push_str(tag);
                // Alignment as an attribute; inline styles do not survive sanitizing.
                if let Some(align) = node.data("align") {
                    write!(out, r#" align="{}""#, escape_html(align)).unwrap();
                }
                write!(out, "{}>", attributes(node)).unwrap();
                self.children_into(node, out);
                write!(out, "</{tag}>").unwrap();
            }
            kind::FOOTNOTE_DEFINITION => {
                let label = escape_html(node.data("label").unwrap_or_default());
                write!(
                    out,
                    r#"<div class="footnote-definition" id="fn-{label}"><sup class="footnote-definition-label">{label}</sup>"#
                )
                .unwrap();
                self.children_into(node, out);
                out.push_str("</div>");
            }
            kind::DEFINITION_LIST => self.element("dl", node, out),
            kind::DEFINITION_TITLE => self.element("dt", node, out),
            kind::DEFINITION_DETAILS => self.element("dd", node, out),
            kind::TEXT => out.push_str(&escape_html(node.literal.as_deref().unwrap_or_default())),
            kind::CODE => write!(
                out,
                "<code{}>{}</code>",
                attributes(node),
                escape_html(node.literal.as_deref().unwrap_or_default())
            )
            .unwrap(),
            kind::EMPHASIS => self.element("em", node, out),
            kind::STRONG => self.element("strong", node, out),
            kind::STRIKETHROUGH => self.element("s", node, out),
            kind::SUPERSCRIPT => self.element("sup", node, out),
            kind::SUBSCRIPT => self.element("sub", node, out),
            kind::LINK => {
                write!(
                    out,
                    r#"<a href="{}"{}{}>"#,
                    escape_html(node.data("href").unwrap_or_default()),
                    title_attribute(node),
                    attributes(node)
                )
                .unwrap();
                self.children_into(node, out);
                out.push_str("</a>");
            }
            kind::IMAGE => write!(
                out,
                r#"<img src="{}"{} alt="{}"{}>"#,
                escape_html(node.data("src").unwrap_or_default()),
                title_attribute(node),
                escape_html(&node.text_content()),
                attributes(node)
            )
            .unwrap(),
            kind::FOOTNOTE_REFERENCE => {
                let label = escape_html(node.data("label").unwrap_or_default());
                write!(
                    out,
                    r##"<sup class="footnote-reference"><a href="#fn-{label}">{label}</a></sup>"##
                )
                .unwrap();
            }
            kind::SOFT_BREAK => out.push('\n'),
            kind::HARD_BREAK => out.push_str("<br>\n"),
            kind::TASK_MARKER => {
                out.push_str(if node.data("checked") == Some("true") {
                    "[x] "
                } else {
                    "[ ] "
                });
            }
            // Unknown kinds contributed by extensions without a renderer.
            _ => match &node.literal {
                Some(literal) if node.children.is_empty() => out.push_str(&escape_html(literal)),
                _ => self.children_into(node, out),
            },
        }
    }
}

/// ` name="value"` pairs for a node's attributes.
fn attributes(node: &Node) -> String {
    let mut out = String::new();
    for (name, value) in &node.attributes {
        write!(out, r#" {}="{}""#, escape_html(name), escape_html(value)).unwrap();
    }
    out
}

fn title_attribute(node: &Node) -> String {
    node.data("title")
        .map(|title| format!(r#" title="{}""#, escape_html(title)))
        .unwrap_or_default()
}

fn alert_title(alert: &str) -> String {
    let mut chars = alert.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

use std::sync::Arc;

use crate::capability::{Capability, Extension, InlineMatch, InlineParser, InlineRenderer};
use crate::html::{RenderContext, escape_html};
use crate::node::Node;

/// Node kind produced by [`Kbd`].
const KBD: &str = "kbd";

/// Keyboard shortcuts: `[[Ctrl+C]]` renders as `<kbd>Ctrl</kbd>+<kbd>C</kbd>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Kbd;

impl InlineParser for Kbd {
    fn triggers(&self) -> &[char] {
        &['[']
    }

    fn parse(&self, input: &str) -> Option<InlineMatch> {
        let rest = input.strip_prefix("[[")?;
        let end = rest.find("]]")?;
        let keys = &rest[..end];
        if keys.trim().is_empty() || keys.contains(['[', ']', '\n']) {
            return None;
        }
        Some(InlineMatch {
            consumed: end + 4,
            node: Node::inline(KBD).with_data("keys", keys.trim()),
        })
    }
}

impl InlineRenderer for Kbd {
    fn node_kind(&self) -> &str {
        KBD
    }

    fn render(&self, node: &Node, _context: &RenderContext<'_>) -> String {
        node.data("keys")
            .unwrap_or_default()
            .split('+')
            .map(|key| format!("<kbd>{}</kbd>", escape_html(key.trim())))
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl Extension for Kbd {
    fn capabilities(&self) -> &[Capability] {
        &[Capability::InlineParser, Capability::InlineRenderer]
    }

    fn as_inline_parser(self: Arc<Self>) -> Option<Arc<dyn InlineParser>> {
        Some(self)
    }

    fn as_inline_renderer(self: Arc<Self>) -> Option<Arc<dyn InlineRenderer>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use mdkit_plugin::Settings;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::backend::CommonMarkBackend;
    use crate::convert::convert;
    use crate::environment::EnvironmentBuilder;

    #[test]
    fn test_parse() {
        let found = Kbd.parse("[[Ctrl+C]] to copy").unwrap();

        assert_eq!(found.consumed, 10);
        assert_eq!(found.node.data("keys"), Some("Ctrl+C"));
        assert_eq!(Kbd.parse("[[]]"), None);
        assert_eq!(Kbd.parse("[[a [b]]"), None);
        assert_eq!(Kbd.parse("[x]"), None);
    }

    #[test]
    fn test_converts_outside_code_only() {
        let mut builder = EnvironmentBuilder::new(
            "commonmark",
            Arc::new(CommonMarkBackend::new("commonmark")),
            Settings::new(),
        );
        builder.attach("kbd", Arc::new(Kbd)).unwrap();
        let environment = builder.build();

        assert_eq!(
            convert("Press [[Ctrl + Shift+P]], not `[[x]]`.", &environment).unwrap(),
            "<p>Press <kbd>Ctrl</kbd>+<kbd>Shift</kbd>+<kbd>P</kbd>, not <code>[[x]]</code>.</p>"
        );
    }
}

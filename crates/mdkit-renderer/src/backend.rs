//! Parser backends.
//!
//! A backend turns markdown into a [`Node`] tree. Everything around that
//! (extension block rules, inline rules, processors, rendering) is shared
//! and driven by the [`Environment`] the backend runs in.

use mdkit_plugin::{BROKEN_ID, Settings};
use pulldown_cmark::{Options, Parser};
use serde_json::Value;

use crate::environment::Environment;
use crate::node::{Node, kind};
use crate::pipeline;
use crate::tree;

/// Error raised by a parser backend.
///
/// Propagated unchanged through [`convert`](crate::convert).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parser `{parser}` failed: {message}")]
pub struct BackendError {
    /// Id of the failing parser.
    pub parser: String,
    /// Backend-provided message.
    pub message: String,
}

impl BackendError {
    /// Create an error for `parser`.
    pub fn new(parser: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            parser: parser.into(),
            message: message.into(),
        }
    }
}

/// Per-call inputs available to [`ParserBackend::parse_document`].
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    /// Locale requested for this conversion.
    pub locale: &'a str,
    /// Environment configuration (parser settings plus extension fragments).
    pub config: &'a Settings,
}

impl ParseContext<'_> {
    /// Boolean flag from the configuration, `false` when absent.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.config.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// A markdown parser backend.
pub trait ParserBackend: Send + Sync {
    /// Parser id.
    fn id(&self) -> &str;

    /// Backend version, when known.
    fn version(&self) -> Option<String> {
        None
    }

    /// Parse markdown into a document tree.
    fn parse_document(&self, text: &str, context: &ParseContext<'_>) -> Result<Node, BackendError>;

    /// Convert markdown to (unsanitized) HTML inside `environment`.
    fn parse(
        &self,
        text: &str,
        locale: &str,
        environment: &Environment,
    ) -> Result<String, BackendError> {
        let context = ParseContext {
            locale,
            config: environment.config(),
        };
        pipeline::run(environment, text, &|source| {
            self.parse_document(source, &context)
        })
    }
}

/// `CommonMark` backend built on pulldown-cmark.
///
/// Grammar options are read from the environment configuration, so
/// extensions enable them by contributing settings:
///
/// | key | option |
/// |---|---|
/// | `tables` | pipe tables |
/// | `strikethrough` | `~~text~~` |
/// | `tasklists` | `- [x] item` |
/// | `footnotes` | `[^label]` |
/// | `smart_punctuation` | curly quotes, dashes, ellipses |
/// | `heading_attributes` | `# Title {#id .class}` |
/// | `definition_lists` | `term` / `: details` |
/// | `alerts` | `> [!NOTE]` blockquotes |
#[derive(Debug, Clone)]
pub struct CommonMarkBackend {
    id: String,
    version: Option<String>,
}

impl CommonMarkBackend {
    /// Create a backend registered under `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: None,
        }
    }

    /// Report `version` from [`ParserBackend::version`].
    #[must_use]
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    /// pulldown-cmark options for a configuration.
    #[must_use]
    pub fn options(context: &ParseContext<'_>) -> Options {
        const FLAGS: [(&str, Options); 8] = [
            ("tables", Options::ENABLE_TABLES),
            ("strikethrough", Options::ENABLE_STRIKETHROUGH),
            ("tasklists", Options::ENABLE_TASKLISTS),
            ("footnotes", Options::ENABLE_FOOTNOTES),
            ("smart_punctuation", Options::ENABLE_SMART_PUNCTUATION),
            ("heading_attributes", Options::ENABLE_HEADING_ATTRIBUTES),
            ("definition_lists", Options::ENABLE_DEFINITION_LIST),
            ("alerts", Options::ENABLE_GFM),
        ];

        FLAGS
            .iter()
            .filter(|(key, _)| context.flag(key))
            .fold(Options::empty(), |options, (_, flag)| options | *flag)
    }
}

impl ParserBackend for CommonMarkBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }

    fn parse_document(&self, text: &str, context: &ParseContext<'_>) -> Result<Node, BackendError> {
        Ok(tree::build(Parser::new_ext(text, Self::options(context))))
    }
}

/// Backend used when no installed parser is available.
///
/// Emits the input as one escaped paragraph.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokenBackend;

impl ParserBackend for BrokenBackend {
    fn id(&self) -> &str {
        BROKEN_ID
    }

    fn parse_document(&self, text: &str, _context: &ParseContext<'_>) -> Result<Node, BackendError> {
        Ok(Node::document()
            .with_child(Node::block(kind::PARAGRAPH).with_child(Node::text(text.trim()))))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    static_assertions::assert_impl_all!(super::CommonMarkBackend: Send, Sync);
    static_assertions::assert_impl_all!(super::BrokenBackend: Send, Sync);

    fn settings(value: Value) -> Settings {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_options_from_config() {
        let config = settings(json!({"tables": true, "strikethrough": false, "footnotes": true}));
        let context = ParseContext {
            locale: "en",
            config: &config,
        };

        let options = CommonMarkBackend::options(&context);

        assert!(options.contains(Options::ENABLE_TABLES));
        assert!(options.contains(Options::ENABLE_FOOTNOTES));
        assert!(!options.contains(Options::ENABLE_STRIKETHROUGH));
    }

    #[test]
    fn test_options_ignore_non_bool() {
        let config = settings(json!({"tables": "yes"}));
        let context = ParseContext {
            locale: "en",
            config: &config,
        };

        assert_eq!(CommonMarkBackend::options(&context), Options::empty());
    }

    #[test]
    fn test_commonmark_parse_document() {
        let config = Settings::new();
        let context = ParseContext {
            locale: "en",
            config: &config,
        };

        let doc = CommonMarkBackend::new("commonmark")
            .parse_document("# Title\n\nBody", &context)
            .unwrap();

        let kinds: Vec<&str> = doc.children.iter().map(|n| n.kind.as_str()).collect();
        assert_eq!(kinds, vec!["heading", "paragraph"]);
        assert_eq!(doc.children[1].text_content(), "Body");
    }

    #[test]
    fn test_broken_backend_single_paragraph() {
        let config = Settings::new();
        let context = ParseContext {
            locale: "en",
            config: &config,
        };

        let doc = BrokenBackend
            .parse_document("  # not a heading  ", &context)
            .unwrap();

        assert_eq!(doc.children.len(), 1);
        assert_eq!(doc.children[0].text_content(), "# not a heading");
    }
}

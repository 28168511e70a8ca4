//! Extension capabilities.
//!
//! An extension object may fill any number of pipeline roles. Each role is a
//! trait; an [`Extension`] declares the roles it claims through
//! [`Extension::capabilities`] and hands out the matching trait objects
//! through the `as_*` accessors. The composer checks every declared role
//! against its accessor, so a claim without an implementation is caught at
//! composition time instead of at conversion time.

use std::fmt;
use std::sync::Arc;

use mdkit_plugin::Settings;

use crate::environment::EnvironmentBuilder;
use crate::html::RenderContext;
use crate::node::Node;

/// One pipeline role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Receives the environment builder before any other attachment.
    EnvironmentAware,
    /// Contributes a settings fragment to the environment configuration.
    Settings,
    /// Block-level grammar rule.
    BlockParser,
    /// HTML renderer for one block node kind.
    BlockRenderer,
    /// Inline-level grammar rule.
    InlineParser,
    /// HTML renderer for one inline node kind.
    InlineRenderer,
    /// Runs once per parsed document before rendering.
    DocumentProcessor,
    /// Runs over each inline node stream.
    InlineProcessor,
}

impl Capability {
    /// Every capability, in attachment order.
    pub const ALL: [Capability; 8] = [
        Capability::EnvironmentAware,
        Capability::Settings,
        Capability::BlockParser,
        Capability::BlockRenderer,
        Capability::InlineParser,
        Capability::InlineRenderer,
        Capability::DocumentProcessor,
        Capability::InlineProcessor,
    ];

    /// Stable name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnvironmentAware => "environment-aware",
            Self::Settings => "settings",
            Self::BlockParser => "block-parser",
            Self::BlockRenderer => "block-renderer",
            Self::InlineParser => "inline-parser",
            Self::InlineRenderer => "inline-renderer",
            Self::DocumentProcessor => "document-processor",
            Self::InlineProcessor => "inline-processor",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registers sub-extensions or renderers into the environment.
pub trait EnvironmentAware: Send + Sync {
    /// Called once while the environment is composed.
    fn register(&self, environment: &mut EnvironmentBuilder);
}

/// Contributes settings to the environment configuration.
pub trait SettingsProvider: Send + Sync {
    /// Fragment deep-merged into the environment configuration.
    fn settings(&self) -> Settings;
}

/// A block matched by a [`BlockParser`].
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMatch {
    /// Number of source lines consumed (at least one).
    pub consumed: usize,
    /// Node replacing the consumed lines.
    pub node: Node,
    /// Markdown parsed and appended as the node's children.
    pub body: Option<String>,
}

/// Block-level grammar rule.
pub trait BlockParser: Send + Sync {
    /// Try to match a block starting at `lines[0]`.
    ///
    /// Lines inside fenced code are never offered.
    fn parse(&self, lines: &[&str]) -> Option<BlockMatch>;
}

/// Renders one block node kind.
pub trait BlockRenderer: Send + Sync {
    /// Node kind this renderer handles.
    fn node_kind(&self) -> &str;

    /// Render the node to HTML.
    fn render(&self, node: &Node, context: &RenderContext<'_>) -> String;
}

/// An inline node matched by an [`InlineParser`].
#[derive(Debug, Clone, PartialEq)]
pub struct InlineMatch {
    /// Number of bytes consumed from the input.
    pub consumed: usize,
    /// Node replacing the consumed text.
    pub node: Node,
}

/// Inline-level grammar rule.
pub trait InlineParser: Send + Sync {
    /// Characters at which [`parse`](Self::parse) is attempted.
    fn triggers(&self) -> &[char];

    /// Try to match at the start of `input` (which starts with a trigger).
    fn parse(&self, input: &str) -> Option<InlineMatch>;
}

/// Renders one inline node kind.
pub trait InlineRenderer: Send + Sync {
    /// Node kind this renderer handles.
    fn node_kind(&self) -> &str;

    /// Render the node to HTML.
    fn render(&self, node: &Node, context: &RenderContext<'_>) -> String;
}

/// Rewrites a parsed document.
pub trait DocumentProcessor: Send + Sync {
    /// Process the document in place.
    fn process(&self, document: &mut Node, config: &Settings);
}

/// Rewrites one inline node stream (the inline children of a block).
pub trait InlineProcessor: Send + Sync {
    /// Process the stream in place.
    fn process(&self, inlines: &mut Vec<Node>, config: &Settings);
}

/// A composable extension object.
///
/// Implementors list their roles in [`capabilities`](Self::capabilities) and
/// override the matching accessors to return `Some(self)`:
///
/// ```
/// use std::sync::Arc;
/// use mdkit_renderer::{BlockRenderer, Capability, Extension, Node, RenderContext};
///
/// struct Shout;
///
/// impl BlockRenderer for Shout {
///     fn node_kind(&self) -> &str {
///         "paragraph"
///     }
///
///     fn render(&self, node: &Node, _context: &RenderContext<'_>) -> String {
///         format!("<p>{}</p>", node.text_content().to_uppercase())
///     }
/// }
///
/// impl Extension for Shout {
///     fn capabilities(&self) -> &[Capability] {
///         &[Capability::BlockRenderer]
///     }
///
///     fn as_block_renderer(self: Arc<Self>) -> Option<Arc<dyn BlockRenderer>> {
///         Some(self)
///     }
/// }
/// ```
pub trait Extension: Send + Sync {
    /// Roles this extension claims.
    fn capabilities(&self) -> &[Capability];

    /// Environment-aware role.
    fn as_environment_aware(self: Arc<Self>) -> Option<Arc<dyn EnvironmentAware>> {
        None
    }

    /// Settings role.
    fn as_settings_provider(self: Arc<Self>) -> Option<Arc<dyn SettingsProvider>> {
        None
    }

    /// Block parser role.
    fn as_block_parser(self: Arc<Self>) -> Option<Arc<dyn BlockParser>> {
        None
    }

    /// Block renderer role.
    fn as_block_renderer(self: Arc<Self>) -> Option<Arc<dyn BlockRenderer>> {
        None
    }

    /// Inline parser role.
    fn as_inline_parser(self: Arc<Self>) -> Option<Arc<dyn InlineParser>> {
        None
    }

    /// Inline renderer role.
    fn as_inline_renderer(self: Arc<Self>) -> Option<Arc<dyn InlineRenderer>> {
        None
    }

    /// Document processor role.
    fn as_document_processor(self: Arc<Self>) -> Option<Arc<dyn DocumentProcessor>> {
        None
    }

    /// Inline processor role.
    fn as_inline_processor(self: Arc<Self>) -> Option<Arc<dyn InlineProcessor>> {
        None
    }
}

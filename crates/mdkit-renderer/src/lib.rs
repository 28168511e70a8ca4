//! Capability-routed markdown conversion.
//!
//! A parser backend turns text into a [`Node`] tree; extensions hook into
//! parsing, post-processing and rendering through the capabilities they
//! declare. [`compose`] attaches a parser and its extensions into an
//! immutable [`Environment`], and [`convert`] runs text through it.
//!
//! # Architecture
//!
//! - [`Catalog`]: class names and symbols the plugin manifests resolve
//!   against, plus the built-in manifest.
//! - [`Markdown`]: the service a host keeps; selects the parser and
//!   extensions from its [`mdkit_config::Config`] and caches environments.
//! - [`EnvironmentBuilder`]: capability router used by [`compose`] and by
//!   environment-aware extensions registering sub-extensions.
//! - [`extensions`]: extensions shipped with the crate.
//!
//! # Example
//!
//! ```
//! use mdkit_config::Config;
//! use mdkit_renderer::{Catalog, Markdown};
//!
//! let markdown = Markdown::new(Catalog::builtin(), Config::default());
//! let html = markdown.convert("# Hello\n\n:::note\nBody\n:::").unwrap();
//! assert!(html.starts_with(r#"<h1 id="hello">Hello</h1>"#));
//! ```

mod backend;
mod cache;
mod capability;
mod catalog;
mod compose;
mod convert;
mod environment;
pub mod extensions;
mod fence;
mod html;
mod markdown;
mod node;
mod pipeline;
pub mod sanitize;
mod tree;

pub use backend::{BackendError, BrokenBackend, CommonMarkBackend, ParseContext, ParserBackend};
pub use cache::{EnvironmentCache, EnvironmentKey};
pub use capability::{
    BlockMatch, BlockParser, BlockRenderer, Capability, DocumentProcessor, EnvironmentAware,
    Extension, InlineMatch, InlineParser, InlineProcessor, InlineRenderer, SettingsProvider,
};
pub use catalog::{Catalog, Constructor, ExtensionFactory, ParserFactory, version};
pub use compose::{ResolvedExtension, ResolvedParser, compose};
pub use convert::{convert, convert_with_locale};
pub use environment::{
    Attachment, DEFAULT_LOCALE, Diagnostic, Environment, EnvironmentBuilder,
    ExtensionContractViolation,
};
pub use html::{RenderContext, escape_html};
pub use markdown::Markdown;
pub use node::{Node, NodeLevel, kind};

//! Environment composition.

use std::sync::Arc;

use mdkit_config::PluginInstance;

use crate::backend::ParserBackend;
use crate::capability::Extension;
use crate::environment::{Environment, EnvironmentBuilder};

/// A parser instance paired with its backend.
#[derive(Clone)]
pub struct ResolvedParser {
    /// Configured parser instance.
    pub instance: PluginInstance,
    /// Backend performing the parsing.
    pub backend: Arc<dyn ParserBackend>,
}

/// An extension instance paired with its runtime object.
#[derive(Clone)]
pub struct ResolvedExtension {
    /// Configured extension instance.
    pub instance: PluginInstance,
    /// Object providing the extension's capabilities.
    pub extension: Arc<dyn Extension>,
}

/// Build an environment from a parser and extensions in attachment order.
///
/// The configuration starts from the parser's effective settings. Each
/// compatible extension is attached in order; an extension whose `parsers`
/// list excludes the active parser is skipped without contributing anything.
/// Contract violations skip only the offending extension and are recorded in
/// [`Environment::diagnostics`].
#[must_use]
pub fn compose(parser: &ResolvedParser, extensions: &[ResolvedExtension]) -> Environment {
    let parser_id = parser.instance.id();
    let mut builder = EnvironmentBuilder::new(
        parser_id,
        Arc::clone(&parser.backend),
        parser.instance.settings(),
    );

    for resolved in extensions {
        let id = resolved.instance.id();
        if !resolved.instance.definition().is_compatible_with(parser_id) {
            tracing::debug!(extension = %id, parser = %parser_id, "Extension not compatible with parser, skipping");
            continue;
        }
        // Violations are recorded as diagnostics by the builder.
        let _ = builder.attach(id, Arc::clone(&resolved.extension));
    }

    builder.build()
}

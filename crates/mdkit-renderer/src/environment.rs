//! Conversion environments.
//!
//! An [`Environment`] is one parser backend plus the extension roles
//! attached to it, routed by capability. It holds no per-document state and
//! is shared across conversions behind an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use mdkit_plugin::{Settings, nested};

use crate::backend::ParserBackend;
use crate::capability::{
    BlockParser, BlockRenderer, Capability, DocumentProcessor, EnvironmentAware, Extension,
    InlineParser, InlineProcessor, InlineRenderer, SettingsProvider,
};

/// Sub-extensions registered by environment-aware extensions may nest this deep.
const MAX_NESTING: usize = 8;

/// Locale used when none is requested.
pub const DEFAULT_LOCALE: &str = "en";

/// An extension declared a capability it does not implement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("extension `{extension}` declares {capability} but does not implement it")]
pub struct ExtensionContractViolation {
    /// Id of the offending extension.
    pub extension: String,
    /// First declared capability found missing.
    pub capability: Capability,
}

/// A note recorded while composing an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Extension the note is about.
    pub extension: String,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.extension, self.message)
    }
}

/// A role attached to the environment, in attachment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Extension id (sub-extensions report their owner).
    pub extension: String,
    /// Attached role.
    pub capability: Capability,
}

struct Registered<T: ?Sized> {
    extension: String,
    value: Arc<T>,
}

/// A composed conversion environment.
pub struct Environment {
    parser_id: String,
    parser: Arc<dyn ParserBackend>,
    locale: String,
    config: Settings,
    extensions: Vec<String>,
    block_parsers: Vec<Arc<dyn BlockParser>>,
    block_renderers: HashMap<String, Registered<dyn BlockRenderer>>,
    inline_parsers: Vec<Arc<dyn InlineParser>>,
    inline_renderers: HashMap<String, Registered<dyn InlineRenderer>>,
    document_processors: Vec<Arc<dyn DocumentProcessor>>,
    inline_processors: Vec<Arc<dyn InlineProcessor>>,
    attachments: Vec<Attachment>,
    diagnostics: Vec<Diagnostic>,
}

impl Environment {
    /// Use `locale` for conversions that do not request one.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Active parser id.
    #[must_use]
    pub fn parser_id(&self) -> &str {
        &self.parser_id
    }

    /// Active parser backend.
    #[must_use]
    pub fn parser(&self) -> &Arc<dyn ParserBackend> {
        &self.parser
    }

    /// Default locale.
    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Merged configuration: parser settings, then extension fragments in order.
    #[must_use]
    pub fn config(&self) -> &Settings {
        &self.config
    }

    /// Ids of extensions that attached successfully, in order.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Block parsers in registration order.
    #[must_use]
    pub fn block_parsers(&self) -> &[Arc<dyn BlockParser>] {
        &self.block_parsers
    }

    /// Renderer registered for a block node kind.
    #[must_use]
    pub fn block_renderer(&self, kind: &str) -> Option<&Arc<dyn BlockRenderer>> {
        self.block_renderers.get(kind).map(|r| &r.value)
    }

    /// Inline parsers in registration order.
    #[must_use]
    pub fn inline_parsers(&self) -> &[Arc<dyn InlineParser>] {
        &self.inline_parsers
    }

    /// Renderer registered for an inline node kind.
    #[must_use]
    pub fn inline_renderer(&self, kind: &str) -> Option<&Arc<dyn InlineRenderer>> {
        self.inline_renderers.get(kind).map(|r| &r.value)
    }

    /// Document processors in registration order.
    #[must_use]
    pub fn document_processors(&self) -> &[Arc<dyn DocumentProcessor>] {
        &self.document_processors
    }

    /// Inline processors in registration order.
    #[must_use]
    pub fn inline_processors(&self) -> &[Arc<dyn InlineProcessor>] {
        &self.inline_processors
    }

    /// Every attached role, in order.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Roles attached on behalf of one extension.
    #[must_use]
    pub fn capabilities_of(&self, extension: &str) -> Vec<Capability> {
        self.attachments
            .iter()
            .filter(|a| a.extension == extension)
            .map(|a| a.capability)
            .collect()
    }

    /// Notes recorded during composition (contract violations, overrides).
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("parser_id", &self.parser_id)
            .field("locale", &self.locale)
            .field("config", &self.config)
            .field("extensions", &self.extensions)
            .field("attachments", &self.attachments)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

/// Roles an extension declared, checked against its accessors.
#[derive(Default)]
struct Roles {
    environment_aware: Option<Arc<dyn EnvironmentAware>>,
    settings: Option<Arc<dyn SettingsProvider>>,
    block_parser: Option<Arc<dyn BlockParser>>,
    block_renderer: Option<Arc<dyn BlockRenderer>>,
    inline_parser: Option<Arc<dyn InlineParser>>,
    inline_renderer: Option<Arc<dyn InlineRenderer>>,
    document_processor: Option<Arc<dyn DocumentProcessor>>,
    inline_processor: Option<Arc<dyn InlineProcessor>>,
}

impl Roles {
    fn of(id: &str, extension: &Arc<dyn Extension>) -> Result<Self, ExtensionContractViolation> {
        let mut roles = Self::default();
        for &capability in extension.capabilities() {
            let extension = Arc::clone(extension);
            let present = match capability {
                Capability::EnvironmentAware => {
                    roles.environment_aware = extension.as_environment_aware();
                    roles.environment_aware.is_some()
                }
                Capability::Settings => {
                    roles.settings = extension.as_settings_provider();
                    roles.settings.is_some()
                }
                Capability::BlockParser => {
                    roles.block_parser = extension.as_block_parser();
                    roles.block_parser.is_some()
                }
                Capability::BlockRenderer => {
                    roles.block_renderer = extension.as_block_renderer();
                    roles.block_renderer.is_some()
                }
                Capability::InlineParser => {
                    roles.inline_parser = extension.as_inline_parser();
                    roles.inline_parser.is_some()
                }
                Capability::InlineRenderer => {
                    roles.inline_renderer = extension.as_inline_renderer();
                    roles.inline_renderer.is_some()
                }
                Capability::DocumentProcessor => {
                    roles.document_processor = extension.as_document_processor();
                    roles.document_processor.is_some()
                }
                Capability::InlineProcessor => {
                    roles.inline_processor = extension.as_inline_processor();
                    roles.inline_processor.is_some()
                }
            };
            if !present {
                return Err(ExtensionContractViolation {
                    extension: id.to_owned(),
                    capability,
                });
            }
        }
        Ok(roles)
    }

    fn is_block(&self) -> bool {
        self.block_parser.is_some() || self.block_renderer.is_some()
    }
}

/// Mutable environment under composition.
///
/// Handed to [`EnvironmentAware::register`], which may add sub-extensions or
/// register roles directly; both are attributed to the registering extension.
pub struct EnvironmentBuilder {
    environment: Environment,
    owner: String,
    depth: usize,
}

impl EnvironmentBuilder {
    /// Start an environment for `parser` with `config` as the base configuration.
    pub fn new(parser_id: impl Into<String>, parser: Arc<dyn ParserBackend>, config: Settings) -> Self {
        Self {
            environment: Environment {
                parser_id: parser_id.into(),
                parser,
                locale: DEFAULT_LOCALE.to_owned(),
                config,
                extensions: Vec::new(),
                block_parsers: Vec::new(),
                block_renderers: HashMap::new(),
                inline_parsers: Vec::new(),
                inline_renderers: HashMap::new(),
                document_processors: Vec::new(),
                inline_processors: Vec::new(),
                attachments: Vec::new(),
                diagnostics: Vec::new(),
            },
            owner: String::new(),
            depth: 0,
        }
    }

    /// Active parser id.
    #[must_use]
    pub fn parser_id(&self) -> &str {
        &self.environment.parser_id
    }

    /// Configuration merged so far.
    #[must_use]
    pub fn config(&self) -> &Settings {
        &self.environment.config
    }

    /// Deep-merge a fragment into the configuration; `fragment` wins on conflicts.
    pub fn merge_config(&mut self, fragment: &Settings) {
        nested::merge_deep(&mut self.environment.config, fragment);
    }

    /// Attach a sub-extension on behalf of the registering extension.
    pub fn add_extension(&mut self, extension: Arc<dyn Extension>) {
        let owner = self.owner.clone();
        if self.depth >= MAX_NESTING {
            self.diagnose(&owner, "sub-extension nesting too deep; skipped");
            return;
        }
        self.depth += 1;
        // Violations are already recorded against the owner.
        let _ = self.attach_as(&owner, extension);
        self.depth -= 1;
        self.owner = owner;
    }

    /// Register a block parser.
    pub fn add_block_parser(&mut self, parser: Arc<dyn BlockParser>) {
        self.environment.block_parsers.push(parser);
        self.record(Capability::BlockParser);
    }

    /// Register a block renderer; replaces any renderer for the same kind.
    pub fn add_block_renderer(&mut self, renderer: Arc<dyn BlockRenderer>) {
        let kind = renderer.node_kind().to_owned();
        let owner = self.owner.clone();
        let previous = self.environment.block_renderers.insert(
            kind.clone(),
            Registered {
                extension: owner.clone(),
                value: renderer,
            },
        );
        if let Some(previous) = previous {
            self.overridden("block", &kind, &previous.extension, &owner);
        }
        self.record(Capability::BlockRenderer);
    }

    /// Register an inline parser.
    pub fn add_inline_parser(&mut self, parser: Arc<dyn InlineParser>) {
        self.environment.inline_parsers.push(parser);
        self.record(Capability::InlineParser);
    }

    /// Register an inline renderer; replaces any renderer for the same kind.
    pub fn add_inline_renderer(&mut self, renderer: Arc<dyn InlineRenderer>) {
        let kind = renderer.node_kind().to_owned();
        let owner = self.owner.clone();
        let previous = self.environment.inline_renderers.insert(
            kind.clone(),
            Registered {
                extension: owner.clone(),
                value: renderer,
            },
        );
        if let Some(previous) = previous {
            self.overridden("inline", &kind, &previous.extension, &owner);
        }
        self.record(Capability::InlineRenderer);
    }

    /// Register a document processor.
    pub fn add_document_processor(&mut self, processor: Arc<dyn DocumentProcessor>) {
        self.environment.document_processors.push(processor);
        self.record(Capability::DocumentProcessor);
    }

    /// Register an inline processor.
    pub fn add_inline_processor(&mut self, processor: Arc<dyn InlineProcessor>) {
        self.environment.inline_processors.push(processor);
        self.record(Capability::InlineProcessor);
    }

    /// Attach a top-level extension under `id`.
    ///
    /// A contract violation skips the whole extension and records a
    /// diagnostic; the builder is left as it was.
    pub fn attach(&mut self, id: &str, extension: Arc<dyn Extension>) -> Result<(), ExtensionContractViolation> {
        self.depth = 0;
        let result = self.attach_as(id, extension);
        if result.is_ok() {
            self.environment.extensions.push(id.to_owned());
        }
        result
    }

    fn attach_as(&mut self, id: &str, extension: Arc<dyn Extension>) -> Result<(), ExtensionContractViolation> {
        let mut roles = match Roles::of(id, &extension) {
            Ok(roles) => roles,
            Err(violation) => {
                tracing::warn!(
                    extension = %violation.extension,
                    capability = %violation.capability,
                    "Extension contract violation, skipping extension"
                );
                self.diagnose(id, &violation.to_string());
                return Err(violation);
            }
        };

        if roles.is_block() && (roles.inline_parser.is_some() || roles.inline_renderer.is_some()) {
            tracing::debug!(extension = %id, "Block roles take precedence, skipping inline parser and renderer");
            roles.inline_parser = None;
            roles.inline_renderer = None;
        }

        self.owner = id.to_owned();

        if let Some(aware) = roles.environment_aware {
            aware.register(self);
            self.owner = id.to_owned();
            self.record(Capability::EnvironmentAware);
        }
        if let Some(provider) = roles.settings {
            self.merge_config(&provider.settings());
            self.record(Capability::Settings);
        }
        if let Some(parser) = roles.block_parser {
            self.add_block_parser(parser);
        }
        if let Some(renderer) = roles.block_renderer {
            self.add_block_renderer(renderer);
        }
        if let Some(parser) = roles.inline_parser {
            self.add_inline_parser(parser);
        }
        if let Some(renderer) = roles.inline_renderer {
            self.add_inline_renderer(renderer);
        }
        if let Some(processor) = roles.document_processor {
            self.add_document_processor(processor);
        }
        if let Some(processor) = roles.inline_processor {
            self.add_inline_processor(processor);
        }
        Ok(())
    }

    fn record(&mut self, capability: Capability) {
        self.environment.attachments.push(Attachment {
            extension: self.owner.clone(),
            capability,
        });
    }

    fn diagnose(&mut self, extension: &str, message: &str) {
        self.environment.diagnostics.push(Diagnostic {
            extension: extension.to_owned(),
            message: message.to_owned(),
        });
    }

    fn overridden(&mut self, level: &str, kind: &str, previous: &str, current: &str) {
        tracing::warn!(
            kind = %kind,
            previous = %previous,
            extension = %current,
            "{level} renderer overridden"
        );
        let message = format!("{level} renderer for `{kind}` from `{previous}` overridden");
        self.diagnose(current, &message);
    }

    /// Finish composition.
    #[must_use]
    pub fn build(self) -> Environment {
        self.environment
    }
}

#[cfg(test)]
pub(crate) fn test_environment() -> Environment {
    EnvironmentBuilder::new(
        "commonmark",
        Arc::new(crate::backend::CommonMarkBackend::new("commonmark")),
        Settings::new(),
    )
    .build()
}

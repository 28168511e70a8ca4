//! Markdown service.
//!
//! [`Markdown`] is the entry point a host holds on to: it owns the parser
//! and extension registries, the host configuration and the environment
//! cache, and turns a parser id into a ready environment.
//!
//! # Selection
//!
//! The parser is the configured `default_parser` when it names an installed
//! parser, otherwise the first installed one. Extensions are the installed,
//! enabled ones compatible with that parser, in registry order re-sorted by
//! their configured weight.

use std::sync::Arc;

use mdkit_config::{Config, PluginInstance};
use mdkit_plugin::{ManifestFile, PluginKind, PluginRegistry};

use crate::backend::{BackendError, BrokenBackend, ParserBackend};
use crate::cache::{EnvironmentCache, EnvironmentKey};
use crate::catalog::{Catalog, ExtensionFactory};
use crate::compose::{ResolvedExtension, ResolvedParser, compose};
use crate::convert::convert_with_locale;
use crate::environment::{DEFAULT_LOCALE, Environment};

/// Conversion service over a catalog and a host configuration.
#[derive(Debug)]
pub struct Markdown {
    catalog: Catalog,
    config: Config,
    parsers: PluginRegistry,
    extensions: PluginRegistry,
    environments: EnvironmentCache,
}

impl Markdown {
    /// Create the service.
    ///
    /// Manifest files listed in the configuration are added after the
    /// catalog's own sources, so they win on duplicate ids.
    #[must_use]
    pub fn new(catalog: Catalog, config: Config) -> Self {
        let catalog = config
            .manifest_paths
            .iter()
            .fold(catalog, |catalog, path| {
                catalog.with_source(Arc::new(ManifestFile::new(path.clone())))
            });
        Self {
            parsers: catalog.registry(PluginKind::Parser),
            extensions: catalog.registry(PluginKind::Extension),
            catalog,
            config,
            environments: EnvironmentCache::new(),
        }
    }

    /// Parser registry.
    #[must_use]
    pub fn parsers(&self) -> &PluginRegistry {
        &self.parsers
    }

    /// Extension registry.
    #[must_use]
    pub fn extensions(&self) -> &PluginRegistry {
        &self.extensions
    }

    /// Host configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Locale used by [`convert`](Self::convert).
    #[must_use]
    pub fn locale(&self) -> &str {
        self.config.locale().unwrap_or(DEFAULT_LOCALE)
    }

    /// Id of the parser used by [`convert`](Self::convert).
    pub fn default_parser_id(&self) -> String {
        if let Some(id) = self.config.default_parser() {
            if self.parsers.installed().iter().any(|def| def.id == id) {
                return id.to_owned();
            }
            let fallback = self.parsers.first_installed_id();
            tracing::warn!(parser = %id, fallback = %fallback, "Configured parser not installed, using fallback");
            return fallback;
        }
        self.parsers.first_installed_id()
    }

    /// Configured parser instance; unknown ids give the `_broken` parser.
    pub fn parser(&self, id: &str) -> PluginInstance {
        PluginInstance::new(self.parsers.get(id), &self.config.parser_overrides(id))
    }

    /// Configured extension instance; unknown ids give the `_broken` extension.
    pub fn extension(&self, id: &str) -> PluginInstance {
        PluginInstance::new(self.extensions.get(id), &self.config.extension_overrides(id))
    }

    /// Parser instance paired with its backend.
    ///
    /// A parser that is not installed, or whose class has no factory, runs
    /// on [`BrokenBackend`].
    pub fn resolved_parser(&self, id: &str) -> ResolvedParser {
        let instance = self.parser(id);
        ResolvedParser {
            backend: self.parser_backend(&instance),
            instance,
        }
    }

    fn parser_backend(&self, instance: &PluginInstance) -> Arc<dyn ParserBackend> {
        let factory = instance
            .definition()
            .class
            .as_deref()
            .and_then(|class| self.catalog.parser_factory(class));

        match factory {
            Some(factory) if instance.is_installed() => factory.create(instance),
            _ => {
                if !instance.definition().is_broken() {
                    tracing::warn!(parser = %instance.id(), "Parser unavailable, using broken parser");
                }
                Arc::new(BrokenBackend)
            }
        }
    }

    /// Extensions applied to `parser_id`, in attachment order.
    pub fn extensions_for(&self, parser_id: &str) -> Vec<ResolvedExtension> {
        self.extension_instances(parser_id)
            .into_iter()
            .map(|(instance, factory)| ResolvedExtension {
                extension: factory.create(&instance),
                instance,
            })
            .collect()
    }

    /// Enabled extension instances for `parser_id` with their factories,
    /// sorted by weight. Nothing is built yet.
    fn extension_instances(&self, parser_id: &str) -> Vec<(PluginInstance, Arc<dyn ExtensionFactory>)> {
        let mut instances: Vec<_> = self
            .extensions
            .installed()
            .into_iter()
            .filter(|def| def.is_compatible_with(parser_id))
            .filter_map(|def| {
                let overrides = self.config.extension_overrides(&def.id);
                let instance = PluginInstance::new(def, &overrides);
                if !instance.is_enabled() {
                    return None;
                }
                let Some(factory) = instance
                    .definition()
                    .class
                    .as_deref()
                    .and_then(|class| self.catalog.extension_factory(class))
                else {
                    tracing::warn!(extension = %instance.id(), "No factory for extension class, skipping");
                    return None;
                };
                let factory = Arc::clone(factory);
                Some((instance, factory))
            })
            .collect();
        instances.sort_by_key(|(instance, _)| instance.weight());
        instances
    }

    /// Environment for the default parser.
    pub fn environment(&self) -> Arc<Environment> {
        self.environment_for(&self.default_parser_id())
    }

    /// Environment for `parser_id`, composed on first use and cached.
    ///
    /// The key comes from the configured instances, so a cache hit builds
    /// no backend or extension objects.
    pub fn environment_for(&self, parser_id: &str) -> Arc<Environment> {
        let parser = self.parser(parser_id);
        let extensions = self.extension_instances(parser.id());
        let locale = self.locale().to_owned();

        let instances: Vec<&PluginInstance> = extensions.iter().map(|(instance, _)| instance).collect();
        let key = EnvironmentKey::for_instances(&parser, &instances, &locale);
        self.environments.get_or_build(key, move || {
            let parser = ResolvedParser {
                backend: self.parser_backend(&parser),
                instance: parser,
            };
            let extensions: Vec<ResolvedExtension> = extensions
                .into_iter()
                .map(|(instance, factory)| ResolvedExtension {
                    extension: factory.create(&instance),
                    instance,
                })
                .collect();
            compose(&parser, &extensions).with_locale(locale)
        })
    }

    /// Convert with the default parser.
    ///
    /// # Errors
    ///
    /// Returns the backend's error unchanged.
    pub fn convert(&self, text: &str) -> Result<String, BackendError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let environment = self.environment();
        convert_with_locale(text, environment.locale(), &environment)
    }

    /// Convert with a specific parser.
    ///
    /// # Errors
    ///
    /// Returns the backend's error unchanged.
    pub fn convert_with(&self, text: &str, parser_id: &str) -> Result<String, BackendError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let environment = self.environment_for(parser_id);
        convert_with_locale(text, environment.locale(), &environment)
    }

    /// Drop discovered definitions and cached environments.
    ///
    /// Call after manifests or plugin classes change.
    pub fn invalidate(&self) {
        self.parsers.invalidate();
        self.extensions.invalidate();
        self.environments.invalidate();
        tracing::info!("Plugin caches invalidated");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mdkit_plugin::{Deferred, RawDefinition, StaticSource};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::backend::ParseContext;
    use crate::capability::{BlockRenderer, Capability, Extension};
    use crate::catalog::Constructor;
    use crate::html::{RenderContext, escape_html};
    use crate::node::{Node, kind};

    static_assertions::assert_impl_all!(super::Markdown: Send, Sync);

    static E2E_CALLS: AtomicUsize = AtomicUsize::new(0);
    static OTHER_CALLS: AtomicUsize = AtomicUsize::new(0);
    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    /// Splits text into paragraphs of plain text, counting calls.
    struct Sample {
        calls: &'static AtomicUsize,
    }

    impl ParserBackend for Sample {
        fn id(&self) -> &str {
            "sample"
        }

        fn version(&self) -> Option<String> {
            Some("1.0".to_owned())
        }

        fn parse_document(&self, text: &str, _context: &ParseContext<'_>) -> Result<Node, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Node::document().with_children(
                text.split("\n\n")
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| Node::block(kind::PARAGRAPH).with_child(Node::text(p))),
            ))
        }
    }

    /// Renders `**text**` paragraphs as `<strong>text</strong>`.
    struct BoldStars;

    impl BlockRenderer for BoldStars {
        fn node_kind(&self) -> &str {
            kind::PARAGRAPH
        }

        fn render(&self, node: &Node, _context: &RenderContext<'_>) -> String {
            let text = node.text_content();
            match text.strip_prefix("**").and_then(|t| t.strip_suffix("**")) {
                Some(inner) => format!("<strong>{}</strong>", escape_html(inner)),
                None => format!("<p>{}</p>", escape_html(&text)),
            }
        }
    }

    impl Extension for BoldStars {
        fn capabilities(&self) -> &[Capability] {
            &[Capability::BlockRenderer]
        }

        fn as_block_renderer(self: Arc<Self>) -> Option<Arc<dyn BlockRenderer>> {
            Some(self)
        }
    }

    fn sample_catalog(
        backend: fn(&PluginInstance) -> Arc<dyn ParserBackend>,
        extension_parsers: &[&str],
    ) -> Catalog {
        Catalog::new()
            .with_parser_class("Sample", Constructor::new(backend))
            .with_extension_class("BoldStars", Constructor::<dyn Extension>::new(|_| Arc::new(BoldStars)))
            .with_source(Arc::new(
                StaticSource::new("sample", "v1")
                    .with_parser(
                        RawDefinition::new("sample")
                            .with_class("Sample")
                            .with_installed(Deferred::Literal(true))
                            .with_version(Deferred::Literal("1.0".to_owned())),
                    )
                    .with_extension(
                        RawDefinition::new("bold-stars")
                            .with_class("BoldStars")
                            .with_parsers(extension_parsers.iter().copied())
                            .enabled_by_default(),
                    ),
            ))
    }

    fn config(toml: &str) -> Config {
        Config::from_toml_str(toml, Path::new("/project")).unwrap()
    }

    #[test]
    fn test_end_to_end_sample() {
        let markdown = Markdown::new(sample_catalog(|_| Arc::new(Sample { calls: &E2E_CALLS }), &["sample"]), Config::default());

        assert_eq!(markdown.default_parser_id(), "sample");
        assert_eq!(markdown.parser("sample").version(), Some("1.0"));
        assert_eq!(markdown.convert("**hi**").unwrap(), "<strong>hi</strong>");

        let calls = E2E_CALLS.load(Ordering::SeqCst);
        assert_eq!(markdown.convert("").unwrap(), "");
        assert_eq!(markdown.convert(" \n\t").unwrap(), "");
        assert_eq!(E2E_CALLS.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_incompatible_extension_leaves_output_unchanged() {
        let markdown = Markdown::new(sample_catalog(|_| Arc::new(Sample { calls: &OTHER_CALLS }), &["other"]), Config::default());

        assert!(markdown.extensions_for("sample").is_empty());
        assert_eq!(markdown.convert("**hi**").unwrap(), "<p>**hi**</p>");
    }

    #[test]
    fn test_environment_cached_until_invalidated() {
        let markdown = Markdown::new(sample_catalog(|_| Arc::new(Sample { calls: &OTHER_CALLS }), &[]), Config::default());

        let first = markdown.environment();
        let second = markdown.environment();
        markdown.invalidate();
        let third = markdown.environment();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_cached_environment_skips_factories() {
        let markdown = Markdown::new(
            sample_catalog(
                |_| {
                    BUILDS.fetch_add(1, Ordering::SeqCst);
                    Arc::new(Sample { calls: &OTHER_CALLS })
                },
                &["sample"],
            ),
            Config::default(),
        );

        assert_eq!(markdown.convert("**a**").unwrap(), "<strong>a</strong>");
        assert_eq!(markdown.convert("**b**").unwrap(), "<strong>b</strong>");
        assert_eq!(BUILDS.load(Ordering::SeqCst), 1);

        markdown.invalidate();
        assert_eq!(markdown.convert("c").unwrap(), "<p>c</p>");
        assert_eq!(BUILDS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_parser_falls_back() {
        let markdown = Markdown::new(Catalog::builtin(), config("[markdown]\ndefault_parser = \"missing\"\n"));

        assert_eq!(markdown.default_parser_id(), "commonmark");
    }

    #[test]
    fn test_unknown_parser_uses_broken_backend() {
        let markdown = Markdown::new(Catalog::builtin(), Config::default());

        let parser = markdown.resolved_parser("missing");

        assert!(parser.instance.definition().is_broken());
        assert_eq!(parser.backend.id(), mdkit_plugin::BROKEN_ID);
        assert_eq!(markdown.convert_with("a *b*", "missing").unwrap(), "<p>a *b*</p>");
    }

    #[test]
    fn test_builtin_defaults() {
        let markdown = Markdown::new(Catalog::builtin(), Config::default());

        let ids: Vec<String> = markdown
            .extensions_for("commonmark")
            .iter()
            .map(|e| e.instance.id().to_owned())
            .collect();
        assert_eq!(ids, vec!["admonitions", "heading-anchors", "strikethrough", "tables"]);
        assert_eq!(
            markdown
                .convert("# Title\n\n| a |\n|---|\n| ~~b~~ |")
                .unwrap(),
            r#"<h1 id="title">Title</h1><table><thead><tr><th>a</th></tr></thead><tbody><tr><td><s>b</s></td></tr></tbody></table>"#
        );
    }

    #[test]
    fn test_raw_html_encoded_script_urls_dropped() {
        let markdown = Markdown::new(Catalog::builtin(), Config::default());

        assert_eq!(
            markdown.convert(r#"<a href="javascript&#58alert(1)">click</a>"#).unwrap(),
            "<p><a>click</a></p>"
        );
        assert_eq!(
            markdown.convert(r#"<a href="javascript&#x000000003a;alert(1)">click</a>"#).unwrap(),
            "<p><a>click</a></p>"
        );
    }

    #[test]
    fn test_source_comments_do_not_move_blocks() {
        let markdown = Markdown::new(Catalog::builtin(), Config::default());
        let expected = r#"<p>first</p><div class="admonition admonition-note"><p class="admonition-title">Note</p><p>body</p></div>"#;

        for comment in ["<!--mdkit:block:0-->", "<!--mdkitblock0:0-->"] {
            let text = format!("{comment}\n\nfirst\n\n:::note\nbody\n:::");
            assert_eq!(markdown.convert(&text).unwrap(), expected);
        }
    }

    #[test]
    fn test_configured_extensions_and_weights() {
        let markdown = Markdown::new(
            Catalog::builtin(),
            config(
                r#"
[markdown]
default_parser = "gfm"

[extensions.typographer]
enabled = true
weight = -20

[extensions.heading-anchors]
enabled = false
"#,
            ),
        );

        let ids: Vec<String> = markdown
            .extensions_for("gfm")
            .iter()
            .map(|e| e.instance.id().to_owned())
            .collect();
        assert_eq!(ids, vec!["typographer", "admonitions"]);
        assert_eq!(
            markdown.convert("# \"Quoted\" -- title\n\n- [x] done").unwrap(),
            "<h1>\u{201c}Quoted\u{201d} \u{2013} title</h1><ul><li>[x] done</li></ul>"
        );
    }

    #[test]
    fn test_manifest_file_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("plugins.toml");
        let mut file = std::fs::File::create(&manifest).unwrap();
        writeln!(
            file,
            "[[extension]]\nid = \"kbd\"\nlabel = \"Keys\"\nclass = \"mdkit_renderer::extensions::Kbd\"\nenabled_by_default = true"
        )
        .unwrap();
        let config = Config::from_toml_str("[markdown]\nmanifests = [\"plugins.toml\"]\n", dir.path()).unwrap();

        let markdown = Markdown::new(Catalog::builtin(), config);

        assert!(markdown.extension("kbd").is_enabled());
        assert_eq!(markdown.extension("kbd").label(false), "Keys");
        assert_eq!(
            markdown.convert("Press [[Esc]]").unwrap(),
            "<p>Press <kbd>Esc</kbd></p>"
        );
    }
}

//! Plugin catalog.
//!
//! A [`Catalog`] ties manifest class names to the code that builds parser
//! backends and extension objects, and carries the [`Symbols`] the manifests
//! are resolved against. [`Catalog::builtin`] holds everything shipped with
//! this crate; hosts add their own classes and manifests on top.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use mdkit_config::PluginInstance;
use mdkit_plugin::{
    DefinitionSource, ManifestSource, PluginClass, PluginKind, PluginRegistry, Settings, Symbols,
};

use crate::backend::{CommonMarkBackend, ParserBackend};
use crate::capability::Extension;
use crate::extensions::{Admonitions, Attributes, Flags, HeadingAnchors, Kbd, Typographer};

/// Manifest of the built-in plugins.
const BUILTIN_MANIFEST: &str = include_str!("builtin.toml");

/// Version of the bundled pulldown-cmark.
const PULLDOWN_CMARK_VERSION: &str = "0.13";

/// Version of this crate.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Builds a parser backend for a configured parser instance.
pub trait ParserFactory: PluginClass {
    /// Create the backend.
    fn create(&self, instance: &PluginInstance) -> Arc<dyn ParserBackend>;
}

/// Builds an extension object for a configured extension instance.
pub trait ExtensionFactory: PluginClass {
    /// Create the extension.
    fn create(&self, instance: &PluginInstance) -> Arc<dyn Extension>;
}

/// Factory backed by a constructor function.
///
/// Usable both as a [`ParserFactory`] (`Constructor<dyn ParserBackend>`) and
/// as an [`ExtensionFactory`] (`Constructor<dyn Extension>`).
pub struct Constructor<T: ?Sized> {
    build: fn(&PluginInstance) -> Arc<T>,
    defaults: Settings,
}

impl<T: ?Sized> Constructor<T> {
    /// Wrap a constructor.
    #[must_use]
    pub fn new(build: fn(&PluginInstance) -> Arc<T>) -> Self {
        Self {
            build,
            defaults: Settings::new(),
        }
    }

    /// Default settings, merged under the manifest's settings.
    #[must_use]
    pub fn with_defaults(mut self, defaults: Settings) -> Self {
        self.defaults = defaults;
        self
    }
}

impl<T: ?Sized> PluginClass for Constructor<T> {
    fn default_settings(&self) -> Settings {
        self.defaults.clone()
    }
}

impl ParserFactory for Constructor<dyn ParserBackend> {
    fn create(&self, instance: &PluginInstance) -> Arc<dyn ParserBackend> {
        (self.build)(instance)
    }
}

impl ExtensionFactory for Constructor<dyn Extension> {
    fn create(&self, instance: &PluginInstance) -> Arc<dyn Extension> {
        (self.build)(instance)
    }
}

/// Classes, symbols and manifests available to a [`Markdown`](crate::Markdown) service.
#[derive(Clone, Default)]
pub struct Catalog {
    symbols: Symbols,
    parsers: HashMap<String, Arc<dyn ParserFactory>>,
    extensions: HashMap<String, Arc<dyn ExtensionFactory>>,
    sources: Vec<Arc<dyn DefinitionSource>>,
    base_settings: HashMap<PluginKind, Settings>,
}

impl Catalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in parsers and extensions.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with_symbols(
                Symbols::new()
                    .with_associated("pulldown_cmark::Parser", "VERSION", PULLDOWN_CMARK_VERSION)
                    .with_constant("PULLDOWN_CMARK_VERSION", PULLDOWN_CMARK_VERSION)
                    .with_callable("mdkit_renderer::version", || Some(version().to_owned())),
            )
            .with_parser_class(
                "mdkit_renderer::CommonMarkBackend",
                Constructor::<dyn ParserBackend>::new(|instance| {
                    Arc::new(
                        CommonMarkBackend::new(instance.id())
                            .with_version(instance.version().map(ToOwned::to_owned)),
                    )
                }),
            )
            .with_extension_class(
                "mdkit_renderer::extensions::Attributes",
                Constructor::<dyn Extension>::new(|instance| {
                    Arc::new(Attributes::new(&instance.settings()))
                }),
            )
            .with_extension_class(
                "mdkit_renderer::extensions::HeadingAnchors",
                Constructor::<dyn Extension>::new(|instance| {
                    Arc::new(HeadingAnchors::new(&instance.settings()))
                }),
            )
            .with_extension_class(
                "mdkit_renderer::extensions::Admonitions",
                Constructor::<dyn Extension>::new(|instance| {
                    Arc::new(Admonitions::new(&instance.settings()))
                }),
            )
            .with_extension_class(
                "mdkit_renderer::extensions::Kbd",
                Constructor::<dyn Extension>::new(|_| Arc::new(Kbd)),
            )
            .with_extension_class(
                "mdkit_renderer::extensions::Typographer",
                Constructor::<dyn Extension>::new(|instance| {
                    Arc::new(Typographer::new(instance.settings()))
                }),
            )
            .with_extension_class(
                "mdkit_renderer::extensions::Flags",
                Constructor::<dyn Extension>::new(|instance| {
                    Arc::new(Flags::new(instance.settings()))
                }),
            )
            .with_source(Arc::new(ManifestSource::new("builtin", BUILTIN_MANIFEST)))
    }

    /// Add symbols, replacing same-named entries.
    #[must_use]
    pub fn with_symbols(mut self, symbols: Symbols) -> Self {
        self.symbols.extend(symbols);
        self
    }

    /// Register a parser class under `name`.
    #[must_use]
    pub fn with_parser_class(
        mut self,
        name: impl Into<String>,
        factory: impl ParserFactory + 'static,
    ) -> Self {
        let name = name.into();
        let factory = Arc::new(factory);
        self.symbols = self.symbols.with_class(name.clone(), Arc::clone(&factory) as Arc<dyn PluginClass>);
        self.parsers.insert(name, factory);
        self
    }

    /// Register an extension class under `name`.
    #[must_use]
    pub fn with_extension_class(
        mut self,
        name: impl Into<String>,
        factory: impl ExtensionFactory + 'static,
    ) -> Self {
        let name = name.into();
        let factory = Arc::new(factory);
        self.symbols = self.symbols.with_class(name.clone(), Arc::clone(&factory) as Arc<dyn PluginClass>);
        self.extensions.insert(name, factory);
        self
    }

    /// Add a definition source. Later sources win on duplicate ids.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn DefinitionSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Set the settings every definition of `kind` inherits. Class defaults
    /// and manifest settings deep-merge over them.
    #[must_use]
    pub fn with_base_settings(mut self, kind: PluginKind, settings: Settings) -> Self {
        self.base_settings.insert(kind, settings);
        self
    }

    /// Symbols manifests are resolved against.
    #[must_use]
    pub fn symbols(&self) -> &Symbols {
        &self.symbols
    }

    /// Parser factory for a class name.
    #[must_use]
    pub fn parser_factory(&self, class: &str) -> Option<&Arc<dyn ParserFactory>> {
        self.parsers.get(class)
    }

    /// Extension factory for a class name.
    #[must_use]
    pub fn extension_factory(&self, class: &str) -> Option<&Arc<dyn ExtensionFactory>> {
        self.extensions.get(class)
    }

    /// Registry of one plugin family over the catalog's sources.
    #[must_use]
    pub fn registry(&self, kind: PluginKind) -> PluginRegistry {
        let registry = PluginRegistry::new(kind, Arc::new(self.symbols.clone()))
            .with_base_settings(self.base_settings.get(&kind).cloned().unwrap_or_default());
        self.sources
            .iter()
            .fold(registry, |registry, source| registry.with_source(Arc::clone(source)))
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parsers: Vec<&String> = self.parsers.keys().collect();
        parsers.sort();
        let mut extensions: Vec<&String> = self.extensions.keys().collect();
        extensions.sort();
        f.debug_struct("Catalog")
            .field("symbols", &self.symbols)
            .field("parsers", &parsers)
            .field("extensions", &extensions)
            .field("sources", &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("base_settings", &self.base_settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    static_assertions::assert_impl_all!(super::Catalog: Send, Sync);

    #[test]
    fn test_builtin_parsers() {
        let registry = Catalog::builtin().registry(PluginKind::Parser);

        assert_eq!(registry.invalid(), Vec::new());
        assert_eq!(
            registry.labels(true, true),
            vec![
                ("commonmark".to_owned(), "CommonMark (0.13)".to_owned()),
                ("gfm".to_owned(), "GitHub Flavored Markdown (0.13)".to_owned()),
            ]
        );
    }

    #[test]
    fn test_gfm_preferred_library_absent() {
        let gfm = Catalog::builtin().registry(PluginKind::Parser).get("gfm");

        assert!(gfm.installed);
        assert_eq!(gfm.preferred_library().map(|lib| lib.id.as_str()), Some("comrak::Arena"));
        assert_eq!(
            gfm.installed_library().map(|lib| lib.id.as_str()),
            Some("pulldown_cmark::Parser")
        );
        assert!(!gfm.is_preferred_library_installed());
    }

    #[test]
    fn test_builtin_extensions_resolve() {
        let registry = Catalog::builtin().registry(PluginKind::Extension);

        let ids: Vec<String> = registry.installed().iter().map(|d| d.id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                "attributes",
                "admonitions",
                "heading-anchors",
                "kbd",
                "strikethrough",
                "tables",
                "typographer",
            ]
        );
        assert_eq!(registry.get("kbd").version.as_deref(), Some(version()));
    }

    #[test]
    fn test_unregistered_class_not_installed() {
        let catalog = Catalog::new().with_source(Arc::new(ManifestSource::new(
            "test",
            "[[extension]]\nid = \"ghost\"\nclass = \"missing::Ghost\"\n",
        )));

        let registry = catalog.registry(PluginKind::Extension);

        assert!(!registry.get("ghost").installed);
        assert!(registry.installed().is_empty());
    }

    #[test]
    fn test_base_settings_per_family() {
        let base = match serde_json::json!({"depth": 2, "strict": true}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let catalog = Catalog::new()
            .with_source(Arc::new(ManifestSource::new(
                "test",
                "[[extension]]\nid = \"toc\"\nsettings = { depth = 6 }\n\n[[parser]]\nid = \"plain\"\n",
            )))
            .with_base_settings(PluginKind::Extension, base);

        let toc = catalog.registry(PluginKind::Extension).get("toc");
        let plain = catalog.registry(PluginKind::Parser).get("plain");

        assert_eq!(
            serde_json::Value::Object(toc.settings.clone()),
            serde_json::json!({"depth": 6, "strict": true})
        );
        assert!(plain.settings.is_empty());
    }

    #[test]
    fn test_factories_create_objects() {
        let catalog = Catalog::builtin();
        let registry = catalog.registry(PluginKind::Extension);
        let instance = PluginInstance::with_defaults(registry.get("typographer"));

        let factory = catalog
            .extension_factory(instance.definition().class.as_deref().unwrap())
            .unwrap();

        let extension = factory.create(&instance);
        assert_eq!(
            extension.capabilities(),
            [crate::Capability::Settings, crate::Capability::InlineProcessor]
        );
    }
}

//! Installable resolution.
//!
//! Turns a [`RawDefinition`] into a [`PluginDefinition`] with `installed`,
//! `version` and library presence fully materialized. Lookups go through an
//! explicit [`Symbols`] table.
//!
//! Resolution is cached per `(kind, id)`, so deferred callables run at most
//! once per definition until [`Resolver::clear`] is called.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::deferred::Deferred;
use crate::definition::{LibraryRequirement, PluginDefinition, PluginKind, RequirementKind};
use crate::manifest::{RawDefinition, RawLibrary};
use crate::nested::{self, Settings};
use crate::symbols::{PluginClass, Symbols};

/// A manifest record whose declarations cannot be resolved.
///
/// Only the offending definition is excluded from discovery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind} definition \"{id}\": {reason}")]
pub struct InvalidDefinitionError {
    /// Plugin family.
    pub kind: PluginKind,
    /// Definition id (or record position when the id is missing).
    pub id: String,
    /// What is wrong.
    pub reason: String,
}

impl InvalidDefinitionError {
    /// Create an error for one definition.
    pub fn new(kind: PluginKind, id: &str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.to_owned(),
            reason: reason.into(),
        }
    }
}

type Resolved = Result<Arc<PluginDefinition>, InvalidDefinitionError>;

/// Resolves raw definitions against a symbol table.
pub struct Resolver {
    symbols: Arc<Symbols>,
    cache: RwLock<HashMap<(PluginKind, String), Resolved>>,
}

impl Resolver {
    /// Create a resolver over `symbols`.
    #[must_use]
    pub fn new(symbols: Arc<Symbols>) -> Self {
        Self {
            symbols,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Symbol table used for lookups.
    #[must_use]
    pub fn symbols(&self) -> &Symbols {
        &self.symbols
    }

    /// Resolve one definition, reusing a previous result for the same id.
    ///
    /// `base_settings` are the family's settings, merged under the class
    /// defaults and the manifest's own settings.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDefinitionError`] if a `version` reference resolves
    /// to nothing or more than one library is flagged preferred.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn resolve(
        &self,
        kind: PluginKind,
        raw: &RawDefinition,
        base_settings: &Settings,
    ) -> Result<Arc<PluginDefinition>, InvalidDefinitionError> {
        let key = (kind, raw.id.clone());
        if let Some(cached) = self.cache.read().unwrap().get(&key) {
            return cached.clone();
        }

        let resolved = self.resolve_uncached(kind, raw, base_settings).map(Arc::new);

        // First writer wins; concurrent resolutions of the same id agree.
        self.cache
            .write()
            .unwrap()
            .entry(key)
            .or_insert(resolved)
            .clone()
    }

    /// Drop all cached resolutions.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn clear(&self) {
        self.cache.write().unwrap().clear();
    }

    fn resolve_uncached(
        &self,
        kind: PluginKind,
        raw: &RawDefinition,
        base_settings: &Settings,
    ) -> Result<PluginDefinition, InvalidDefinitionError> {
        let invalid = |reason: String| InvalidDefinitionError::new(kind, &raw.id, reason);
        let class = raw.class.as_deref().and_then(|name| self.symbols.class(name));
        if let (Some(name), None) = (&raw.class, &class) {
            tracing::debug!(kind = %kind, id = %raw.id, class = %name, "Plugin class not registered");
        }

        let mut settings = base_settings.clone();
        if let Some(class) = &class {
            nested::merge_deep(&mut settings, &class.default_settings());
        }
        if let Some(declared) = &raw.settings {
            nested::merge_deep(&mut settings, declared);
        }

        let libraries = raw
            .libraries
            .iter()
            .map(|lib| self.resolve_library(lib))
            .collect::<Result<Vec<_>, _>>()
            .map_err(&invalid)?;
        if libraries.iter().filter(|lib| lib.preferred).count() > 1 {
            return Err(invalid("more than one library is marked preferred".to_owned()));
        }

        let installed = match &raw.installed {
            Deferred::Literal(installed) => *installed,
            Deferred::Reference(type_name) => self.symbols.has_type(type_name),
            Deferred::Callable(f) => f().unwrap_or(false),
            Deferred::Unresolved if !libraries.is_empty() => {
                libraries.iter().any(|lib| lib.installed)
            }
            Deferred::Unresolved => class.as_deref().is_some_and(PluginClass::installed),
        };

        let version = match &raw.version {
            Deferred::Literal(version) => Some(version.clone()),
            Deferred::Reference(reference) => {
                Some(self.lookup_version(reference).ok_or_else(|| {
                    invalid(format!(
                        "version reference \"{reference}\" is not a constant, qualified constant or callable"
                    ))
                })?)
            }
            Deferred::Callable(f) => f(),
            Deferred::Unresolved => class
                .as_deref()
                .and_then(PluginClass::version)
                .or_else(|| {
                    libraries
                        .iter()
                        .find(|lib| lib.installed)
                        .and_then(|lib| lib.version.clone())
                }),
        };

        Ok(PluginDefinition {
            kind,
            id: raw.id.clone(),
            label: raw.label.clone().unwrap_or_else(|| raw.id.clone()),
            description: raw.description.clone(),
            url: raw.url.clone(),
            class: raw.class.clone(),
            weight: raw.weight,
            libraries,
            installed,
            version,
            settings,
            parsers: raw.parsers.clone(),
            ui: raw.ui,
            preferred: raw.preferred,
            enabled_by_default: raw.enabled_by_default,
        })
    }

    fn resolve_library(&self, raw: &RawLibrary) -> Result<LibraryRequirement, String> {
        let present = match &raw.installed {
            Deferred::Literal(installed) => *installed,
            Deferred::Reference(type_name) => self.symbols.has_type(type_name),
            Deferred::Callable(f) => f().unwrap_or(false),
            Deferred::Unresolved => self.symbols.has_type(&raw.id),
        };
        let runtime_ok = raw
            .requirements
            .iter()
            .filter(|req| req.kind == RequirementKind::Runtime)
            .all(|req| self.symbols.has_type(&req.id));

        let version = match &raw.version {
            Deferred::Literal(version) => Some(version.clone()),
            Deferred::Reference(reference) => Some(self.lookup_version(reference).ok_or_else(|| {
                format!(
                    "library \"{}\": version reference \"{reference}\" does not resolve",
                    raw.id
                )
            })?),
            Deferred::Callable(f) => f(),
            Deferred::Unresolved => None,
        };

        Ok(LibraryRequirement {
            id: raw.id.clone(),
            label: raw.label.clone(),
            preferred: raw.preferred,
            ui: raw.ui,
            requirements: raw.requirements.clone(),
            install_command: raw.install_command.clone(),
            url: raw.url.clone(),
            installed: present && runtime_ok,
            version,
        })
    }

    /// Constant, then `Type::CONST`, then callable.
    fn lookup_version(&self, reference: &str) -> Option<String> {
        if let Some(value) = self.symbols.constant(reference) {
            return Some(value.to_owned());
        }
        if reference.contains("::")
            && let Some(value) = self.symbols.qualified(reference)
        {
            return Some(value.to_owned());
        }
        self.symbols.call(reference)
    }
}

#[cfg(test)]
mod tests {
    static_assertions::assert_impl_all!(super::Resolver: Send, Sync);
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::definition::Requirement;

    struct Sample;

    impl PluginClass for Sample {
        fn installed(&self) -> bool {
            true
        }

        fn version(&self) -> Option<String> {
            Some("9.9".to_owned())
        }

        fn default_settings(&self) -> Settings {
            match json!({"smart": false, "depth": 3}) {
                serde_json::Value::Object(map) => map,
                _ => unreachable!(),
            }
        }
    }

    fn symbols() -> Arc<Symbols> {
        Arc::new(
            Symbols::new()
                .with_type("sample::Parser")
                .with_constant("SAMPLE_VERSION", "1.2")
                .with_associated("sample::Parser", "VERSION", "1.3")
                .with_callable("sample::version", || Some("1.4".to_owned()))
                .with_class("Sample", Arc::new(Sample)),
        )
    }

    fn resolve(raw: &RawDefinition) -> Result<Arc<PluginDefinition>, InvalidDefinitionError> {
        Resolver::new(symbols()).resolve(PluginKind::Parser, raw, &Settings::new())
    }

    #[test]
    fn test_literal_values_kept() {
        let raw = RawDefinition::new("sample")
            .with_installed(Deferred::Literal(true))
            .with_version(Deferred::Literal("1.0".to_owned()));

        let def = resolve(&raw).unwrap();

        assert!(def.installed);
        assert_eq!(def.version.as_deref(), Some("1.0"));
        assert_eq!(def.label, "sample");
    }

    #[test]
    fn test_installed_type_reference() {
        let present = RawDefinition::new("a").with_installed(Deferred::Reference("sample::Parser".to_owned()));
        let absent = RawDefinition::new("b").with_installed(Deferred::Reference("missing::Parser".to_owned()));

        assert!(resolve(&present).unwrap().installed);
        assert!(!resolve(&absent).unwrap().installed);
    }

    #[test]
    fn test_unresolved_uses_class_hooks() {
        let raw = RawDefinition::new("a").with_class("Sample");

        let def = resolve(&raw).unwrap();

        assert!(def.installed);
        assert_eq!(def.version.as_deref(), Some("9.9"));
    }

    #[test]
    fn test_unresolved_without_class_is_not_installed() {
        let def = resolve(&RawDefinition::new("a").with_class("Unknown")).unwrap();

        assert!(!def.installed);
        assert_eq!(def.version, None);
    }

    #[test]
    fn test_version_reference_order() {
        let constant = RawDefinition::new("a").with_version(Deferred::Reference("SAMPLE_VERSION".to_owned()));
        let qualified =
            RawDefinition::new("b").with_version(Deferred::Reference("sample::Parser::VERSION".to_owned()));
        let callable = RawDefinition::new("c").with_version(Deferred::Reference("sample::version".to_owned()));

        assert_eq!(resolve(&constant).unwrap().version.as_deref(), Some("1.2"));
        assert_eq!(resolve(&qualified).unwrap().version.as_deref(), Some("1.3"));
        assert_eq!(resolve(&callable).unwrap().version.as_deref(), Some("1.4"));
    }

    #[test]
    fn test_unresolvable_version_is_invalid() {
        let raw = RawDefinition::new("a").with_version(Deferred::Reference("NOPE".to_owned()));

        let err = resolve(&raw).unwrap_err();

        assert_eq!(err.id, "a");
        assert!(err.reason.contains("NOPE"));
    }

    #[test]
    fn test_settings_layering() {
        let base = match json!({"html_input": "strip", "smart": true}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let declared = match json!({"depth": 6}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let raw = RawDefinition::new("a").with_class("Sample").with_settings(declared);

        let def = Resolver::new(symbols())
            .resolve(PluginKind::Parser, &raw, &base)
            .unwrap();

        assert_eq!(
            serde_json::Value::Object(def.settings.clone()),
            json!({"html_input": "strip", "smart": false, "depth": 6})
        );
    }

    #[test]
    fn test_libraries_installed_and_preferred() {
        let raw = RawDefinition::new("gfm")
            .with_library(RawLibrary::new("absent::Parser").preferred())
            .with_library(
                RawLibrary::new("sample::Parser")
                    .with_version(Deferred::Reference("sample::Parser::VERSION".to_owned())),
            );

        let def = resolve(&raw).unwrap();

        assert!(def.installed);
        assert_eq!(def.version.as_deref(), Some("1.3"));
        assert_eq!(
            def.installed_library().map(|l| l.id.as_str()),
            Some("sample::Parser")
        );
        assert_eq!(
            def.preferred_library().map(|l| l.id.as_str()),
            Some("absent::Parser")
        );
        assert!(!def.is_preferred_library_installed());
    }

    #[test]
    fn test_runtime_requirement_gates_library() {
        let raw = RawDefinition::new("a").with_library(RawLibrary::new("sample::Parser").with_requirement(
            Requirement {
                kind: RequirementKind::Runtime,
                id: "missing::Runtime".to_owned(),
                constraints: std::collections::BTreeMap::new(),
            },
        ));

        let def = resolve(&raw).unwrap();

        assert!(!def.installed);
        assert!(def.installed_library().is_none());
    }

    #[test]
    fn test_multiple_preferred_is_invalid() {
        let raw = RawDefinition::new("a")
            .with_library(RawLibrary::new("x").preferred())
            .with_library(RawLibrary::new("y").preferred());

        assert!(resolve(&raw).is_err());
    }

    #[test]
    fn test_resolution_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let raw = RawDefinition::new("a").with_version(Deferred::callable(move || {
            Some(format!("{}", counter.fetch_add(1, Ordering::SeqCst)))
        }));
        let resolver = Resolver::new(symbols());

        let first = resolver.resolve(PluginKind::Parser, &raw, &Settings::new()).unwrap();
        let second = resolver.resolve(PluginKind::Parser, &raw, &Settings::new()).unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        resolver.clear();
        let third = resolver.resolve(PluginKind::Parser, &raw, &Settings::new()).unwrap();
        assert_eq!(third.version.as_deref(), Some("1"));
    }

    #[test]
    fn test_cache_is_per_kind() {
        let resolver = Resolver::new(symbols());
        let raw = RawDefinition::new("same");

        let parser = resolver.resolve(PluginKind::Parser, &raw, &Settings::new()).unwrap();
        let extension = resolver.resolve(PluginKind::Extension, &raw, &Settings::new()).unwrap();

        assert_eq!(parser.kind, PluginKind::Parser);
        assert_eq!(extension.kind, PluginKind::Extension);
    }
}

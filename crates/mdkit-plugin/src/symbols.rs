//! Runtime symbol table.
//!
//! Manifests refer to runtime facts by name: a type that must exist, a
//! constant holding a version, a callable computing one, a plugin class with
//! its own hooks. [`Symbols`] is the explicit registry those names are looked
//! up in.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::nested::Settings;

/// Hooks a plugin class may provide.
///
/// Used when a manifest leaves `installed`, `version` or `settings`
/// undeclared.
pub trait PluginClass: Send + Sync {
    /// Whether the plugin's backing code is usable.
    fn installed(&self) -> bool {
        true
    }

    /// Version of the backing code.
    fn version(&self) -> Option<String> {
        None
    }

    /// Default settings, merged under the manifest's settings.
    fn default_settings(&self) -> Settings {
        Settings::new()
    }
}

/// Callable returning a version string.
pub type VersionFn = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Named runtime symbols.
#[derive(Clone, Default)]
pub struct Symbols {
    types: HashSet<String>,
    constants: HashMap<String, String>,
    associated: HashMap<(String, String), String>,
    callables: HashMap<String, VersionFn>,
    classes: HashMap<String, Arc<dyn PluginClass>>,
}

impl Symbols {
    /// Empty symbol table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a type as present.
    #[must_use]
    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.types.insert(name.into());
        self
    }

    /// Declare a global constant.
    #[must_use]
    pub fn with_constant(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.constants.insert(name.into(), value.into());
        self
    }

    /// Declare an associated constant, referenced as `Type::NAME`.
    ///
    /// Also declares the type as present.
    #[must_use]
    pub fn with_associated(
        mut self,
        type_name: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let type_name = type_name.into();
        self.types.insert(type_name.clone());
        self.associated
            .insert((type_name, name.into()), value.into());
        self
    }

    /// Declare a callable.
    #[must_use]
    pub fn with_callable(
        mut self,
        name: impl Into<String>,
        f: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.callables.insert(name.into(), Arc::new(f));
        self
    }

    /// Declare a plugin class.
    #[must_use]
    pub fn with_class(mut self, name: impl Into<String>, class: Arc<dyn PluginClass>) -> Self {
        self.classes.insert(name.into(), class);
        self
    }

    /// Add every symbol of `other`, replacing same-named entries.
    pub fn extend(&mut self, other: Symbols) {
        self.types.extend(other.types);
        self.constants.extend(other.constants);
        self.associated.extend(other.associated);
        self.callables.extend(other.callables);
        self.classes.extend(other.classes);
    }

    /// Whether a type is present.
    #[must_use]
    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains(name)
    }

    /// Global constant value.
    #[must_use]
    pub fn constant(&self, name: &str) -> Option<&str> {
        self.constants.get(name).map(String::as_str)
    }

    /// Value of a `Type::NAME` reference.
    ///
    /// The type path may itself contain `::`; the last segment is the name.
    #[must_use]
    pub fn qualified(&self, reference: &str) -> Option<&str> {
        let (type_name, name) = reference.rsplit_once("::")?;
        self.associated
            .get(&(type_name.to_owned(), name.to_owned()))
            .map(String::as_str)
    }

    /// Invoke a callable; `None` if absent or it yields nothing.
    #[must_use]
    pub fn call(&self, name: &str) -> Option<String> {
        self.callables.get(name).and_then(|f| f())
    }

    /// Plugin class by name.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<Arc<dyn PluginClass>> {
        self.classes.get(name).map(Arc::clone)
    }
}

impl fmt::Debug for Symbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.types.iter().collect();
        types.sort();
        let mut classes: Vec<_> = self.classes.keys().collect();
        classes.sort();
        f.debug_struct("Symbols")
            .field("types", &types)
            .field("constants", &self.constants.len())
            .field("associated", &self.associated.len())
            .field("callables", &self.callables.len())
            .field("classes", &classes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    static_assertions::assert_impl_all!(super::Symbols: Send, Sync);
    use super::*;

    struct Versioned;

    impl PluginClass for Versioned {
        fn version(&self) -> Option<String> {
            Some("3.1".to_owned())
        }
    }

    #[test]
    fn test_lookups() {
        let symbols = Symbols::new()
            .with_type("a::B")
            .with_constant("VERSION", "1.0")
            .with_associated("a::C", "VERSION", "2.0")
            .with_callable("a::version", || Some("4.0".to_owned()))
            .with_class("Versioned", Arc::new(Versioned));

        assert!(symbols.has_type("a::B"));
        assert!(symbols.has_type("a::C"));
        assert!(!symbols.has_type("a::D"));
        assert_eq!(symbols.constant("VERSION"), Some("1.0"));
        assert_eq!(symbols.qualified("a::C::VERSION"), Some("2.0"));
        assert_eq!(symbols.qualified("VERSION"), None);
        assert_eq!(symbols.call("a::version").as_deref(), Some("4.0"));
        assert_eq!(symbols.call("missing"), None);
        assert_eq!(
            symbols.class("Versioned").and_then(|c| c.version()).as_deref(),
            Some("3.1")
        );
    }

    #[test]
    fn test_extend_replaces() {
        let mut symbols = Symbols::new().with_constant("V", "1");
        symbols.extend(Symbols::new().with_constant("V", "2").with_type("T"));

        assert_eq!(symbols.constant("V"), Some("2"));
        assert!(symbols.has_type("T"));
    }

    #[test]
    fn test_class_defaults() {
        let symbols = Symbols::new().with_class("Versioned", Arc::new(Versioned));
        let class = symbols.class("Versioned").unwrap();

        assert!(class.installed());
        assert!(class.default_settings().is_empty());
    }
}

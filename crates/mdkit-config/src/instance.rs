//! Configured plugin instances.

use std::sync::Arc;

use mdkit_plugin::{PluginDefinition, Settings};
use serde_json::Value;

use crate::overlay;

/// A resolved definition plus its effective configuration.
///
/// Built per request from a registry lookup and host overrides; holds no
/// shared mutable state.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginInstance {
    definition: Arc<PluginDefinition>,
    defaults: Settings,
    configuration: Settings,
}

impl PluginInstance {
    /// Create an instance with host `overrides` merged onto the defaults.
    #[must_use]
    pub fn new(definition: Arc<PluginDefinition>, overrides: &Settings) -> Self {
        let defaults = overlay::default_configuration(&definition);
        let configuration = overlay::effective_configuration(&defaults, overrides);
        Self {
            definition,
            defaults,
            configuration,
        }
    }

    /// Create an instance with no overrides.
    #[must_use]
    pub fn with_defaults(definition: Arc<PluginDefinition>) -> Self {
        Self::new(definition, &Settings::new())
    }

    /// Resolved definition.
    #[must_use]
    pub fn definition(&self) -> &Arc<PluginDefinition> {
        &self.definition
    }

    /// Plugin id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// Label, optionally with the version appended.
    #[must_use]
    pub fn label(&self, with_version: bool) -> String {
        self.definition.label_with_version(with_version)
    }

    /// Resolved version.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.definition.version.as_deref()
    }

    /// Whether the backing library is present.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.definition.installed
    }

    /// Configured weight, falling back to the declared one.
    #[must_use]
    pub fn weight(&self) -> i64 {
        self.configuration
            .get("weight")
            .and_then(Value::as_i64)
            .unwrap_or(self.definition.weight)
    }

    /// Whether the instance is enabled.
    ///
    /// Plugins without an `enabled` flag (parsers) are always enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        if !self.definition.supports_enabled() {
            return true;
        }
        self.configuration
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(self.definition.enabled_by_default)
    }

    /// Effective settings.
    #[must_use]
    pub fn settings(&self) -> Settings {
        match self.configuration.get("settings") {
            Some(Value::Object(settings)) => settings.clone(),
            _ => Settings::new(),
        }
    }

    /// One effective setting.
    #[must_use]
    pub fn setting(&self, name: &str) -> Option<&Value> {
        match self.configuration.get("settings") {
            Some(Value::Object(settings)) => settings.get(name),
            _ => None,
        }
    }

    /// Settings that differ from their defaults.
    #[must_use]
    pub fn setting_overrides(&self) -> Settings {
        match self.overrides().remove("settings") {
            Some(Value::Object(settings)) => settings,
            _ => Settings::new(),
        }
    }

    /// Default configuration.
    #[must_use]
    pub fn default_configuration(&self) -> &Settings {
        &self.defaults
    }

    /// Effective configuration (defaults plus overrides).
    #[must_use]
    pub fn effective_configuration(&self) -> &Settings {
        &self.configuration
    }

    /// Every deviation from the default configuration.
    #[must_use]
    pub fn overrides(&self) -> Settings {
        overlay::overrides_of(&self.configuration, &self.defaults)
    }

    /// Persistable configuration.
    ///
    /// Always carries `id`, `dependencies` and `weight`; `enabled` for
    /// extensions; `settings` holds only the overridden settings.
    #[must_use]
    pub fn configuration(&self) -> Settings {
        let mut configuration = Settings::new();
        configuration.insert("id".to_owned(), Value::String(self.id().to_owned()));
        let dependencies: Settings = self
            .definition
            .dependencies()
            .into_iter()
            .map(|(kind, ids)| {
                (
                    kind.to_owned(),
                    Value::Array(ids.into_iter().map(Value::String).collect()),
                )
            })
            .collect();
        configuration.insert("dependencies".to_owned(), Value::Object(dependencies));
        configuration.insert("weight".to_owned(), Value::from(self.weight()));
        if self.definition.supports_enabled() {
            configuration.insert("enabled".to_owned(), Value::Bool(self.is_enabled()));
        }
        configuration.insert(
            "settings".to_owned(),
            Value::Object(self.setting_overrides()),
        );
        configuration
    }

    /// [`configuration`](Self::configuration) in serialization order.
    #[must_use]
    pub fn sorted_configuration(&self) -> Settings {
        overlay::sorted(&self.configuration(), self.definition.supports_enabled())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use mdkit_plugin::{LibraryRequirement, PluginKind, Requirement, RequirementKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Settings {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn definition(kind: PluginKind) -> Arc<PluginDefinition> {
        Arc::new(PluginDefinition {
            id: "attributes".to_owned(),
            label: "Attributes".to_owned(),
            weight: 3,
            installed: true,
            version: Some("1.0".to_owned()),
            settings: map(json!({"allow_ids": true, "classes": ["a"]})),
            libraries: vec![LibraryRequirement {
                id: "mdkit::attributes".to_owned(),
                label: None,
                preferred: true,
                ui: true,
                requirements: vec![Requirement {
                    kind: RequirementKind::Parser,
                    id: "commonmark".to_owned(),
                    constraints: BTreeMap::new(),
                }],
                install_command: None,
                url: None,
                installed: true,
                version: None,
            }],
            ..PluginDefinition::broken(kind)
        })
    }

    #[test]
    fn test_defaults() {
        let instance = PluginInstance::with_defaults(definition(PluginKind::Extension));

        assert_eq!(instance.id(), "attributes");
        assert_eq!(instance.weight(), 3);
        assert!(!instance.is_enabled());
        assert_eq!(instance.setting("allow_ids"), Some(&json!(true)));
        assert!(instance.overrides().is_empty());
        assert_eq!(instance.label(true), "Attributes (1.0)");
    }

    #[test]
    fn test_overrides_applied() {
        let instance = PluginInstance::new(
            definition(PluginKind::Extension),
            &map(json!({"weight": -1, "enabled": true, "settings": {"allow_ids": false}})),
        );

        assert_eq!(instance.weight(), -1);
        assert!(instance.is_enabled());
        assert_eq!(
            Value::Object(instance.settings()),
            json!({"allow_ids": false, "classes": ["a"]})
        );
        assert_eq!(
            Value::Object(instance.setting_overrides()),
            json!({"allow_ids": false})
        );
    }

    #[test]
    fn test_parser_always_enabled() {
        let instance = PluginInstance::new(
            definition(PluginKind::Parser),
            &map(json!({"enabled": false})),
        );

        assert!(instance.is_enabled());
        assert!(!instance.configuration().contains_key("enabled"));
    }

    #[test]
    fn test_sorted_configuration() {
        let instance = PluginInstance::new(
            definition(PluginKind::Extension),
            &map(json!({"settings": {"classes": ["a", "b"]}, "enabled": true})),
        );

        let configuration = instance.sorted_configuration();

        let keys: Vec<&String> = configuration.keys().collect();
        assert_eq!(keys, vec!["dependencies", "id", "weight", "enabled", "settings"]);
        assert_eq!(
            Value::Object(configuration),
            json!({
                "dependencies": {"parser": ["commonmark"]},
                "id": "attributes",
                "weight": 3,
                "enabled": true,
                "settings": {"classes": ["a", "b"]}
            })
        );
    }
}

//! Configuration overlay.
//!
//! A plugin instance's configuration is a map with a few well-known
//! top-level keys (`dependencies`, `id`, `weight`, `enabled`, `settings`)
//! plus whatever else a host stores. Defaults come from the definition;
//! host overrides are merged on top and only deviations are persisted.

use mdkit_plugin::{PluginDefinition, Settings, nested};
use serde_json::Value;

/// Default configuration for a definition.
///
/// `id`, `weight`, `enabled` (extensions only, from the definition's
/// default-enabled policy) and `settings` (already layered family base,
/// class defaults and manifest settings).
#[must_use]
pub fn default_configuration(definition: &PluginDefinition) -> Settings {
    let mut configuration = Settings::new();
    configuration.insert("id".to_owned(), Value::String(definition.id.clone()));
    configuration.insert("weight".to_owned(), Value::from(definition.weight));
    if definition.supports_enabled() {
        configuration.insert(
            "enabled".to_owned(),
            Value::Bool(definition.enabled_by_default),
        );
    }
    configuration.insert(
        "settings".to_owned(),
        Value::Object(definition.settings.clone()),
    );
    configuration
}

/// Merge host overrides onto defaults.
///
/// `null` entries in `overrides` (at any depth) mean "use the default" and
/// are dropped first. Remaining entries win per key; nested maps such as
/// `settings` are merged key by key rather than replaced.
#[must_use]
pub fn effective_configuration(defaults: &Settings, overrides: &Settings) -> Settings {
    nested::merged(defaults, &nested::without_nulls(overrides))
}

/// Minimal recursive diff of `configuration` against `defaults`.
///
/// Key order is irrelevant. Values equal to their default are dropped, so
/// an override that restates the default is not persisted.
#[must_use]
pub fn overrides_of(configuration: &Settings, defaults: &Settings) -> Settings {
    nested::diff(configuration, defaults)
}

/// Serialization weight of a top-level configuration key.
fn key_weight(key: &str, supports_enabled: bool) -> i32 {
    match key {
        "dependencies" => -100,
        "id" => -50,
        "weight" => -30,
        "enabled" if supports_enabled => -20,
        "settings" => -10,
        _ => 0,
    }
}

/// Reorder a configuration for serialization.
///
/// `dependencies`, `id`, `weight`, `enabled`, `settings`, then every other
/// key in its original order.
#[must_use]
pub fn sorted(configuration: &Settings, supports_enabled: bool) -> Settings {
    let mut entries: Vec<(&String, &Value)> = configuration.iter().collect();
    // Stable: equal weights keep insertion order.
    entries.sort_by_key(|(key, _)| key_weight(key, supports_enabled));
    entries
        .into_iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

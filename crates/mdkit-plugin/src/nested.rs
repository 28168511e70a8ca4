//! Nested merge and diff helpers for settings maps.
//!
//! Settings are JSON-like trees ([`Settings`]). Two operations are needed
//! throughout the plugin system:
//!
//! - [`merge_deep`]: overlay one tree onto another, recursing into maps and
//!   replacing everything else (right side wins).
//! - [`diff`]: the minimal subtree of `left` that differs from `right`.
//!
//! Map comparison is order-insensitive, so two trees that only differ in key
//! insertion order are equal.

use serde_json::{Map, Value};

/// Settings tree: setting name to value, insertion order preserved.
pub type Settings = Map<String, Value>;

/// Deep-merge `overlay` into `base`.
///
/// Maps are merged key by key; any other value in `overlay` replaces the
/// value in `base`, including arrays.
pub fn merge_deep(base: &mut Settings, overlay: &Settings) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_deep(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Return a new tree with `overlay` deep-merged onto `base`.
#[must_use]
pub fn merged(base: &Settings, overlay: &Settings) -> Settings {
    let mut result = base.clone();
    merge_deep(&mut result, overlay);
    result
}

/// Compute the entries of `left` that are absent from or differ from `right`.
///
/// Nested maps are compared recursively and only the differing leaves are
/// kept. A nested map whose entries all match is omitted entirely.
#[must_use]
pub fn diff(left: &Settings, right: &Settings) -> Settings {
    let mut result = Settings::new();
    for (key, value) in left {
        match (value, right.get(key)) {
            (Value::Object(l), Some(Value::Object(r))) => {
                let nested = diff(l, r);
                if !nested.is_empty() {
                    result.insert(key.clone(), Value::Object(nested));
                }
            }
            (_, Some(other)) if other == value => {}
            _ => {
                result.insert(key.clone(), value.clone());
            }
        }
    }
    result
}

/// Remove `null` entries at every level of the tree.
///
/// A `null` in caller-supplied overrides means "use the default", so it must
/// never reach a merge.
#[must_use]
pub fn without_nulls(settings: &Settings) -> Settings {
    settings
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::Object(map) => Value::Object(without_nulls(map)),
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Convert a TOML table into a settings tree.
///
/// Datetimes become strings; everything else maps one to one.
#[must_use]
pub fn from_toml_table(table: &toml::Table) -> Settings {
    table
        .iter()
        .map(|(key, value)| (key.clone(), from_toml(value)))
        .collect()
}

/// Convert a TOML value into a JSON value.
#[must_use]
pub fn from_toml(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::from(*i),
        toml::Value::Float(f) => Value::from(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.iter().map(from_toml).collect()),
        toml::Value::Table(table) => Value::Object(from_toml_table(table)),
    }
}

/// Serialize a value with map keys sorted at every level.
///
/// Used as a cache key component where insertion order must not matter.
#[must_use]
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn settings(value: Value) -> Settings {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_merge_deep_right_wins() {
        let mut base = settings(json!({"a": 1, "b": {"x": 1, "y": 2}}));
        merge_deep(&mut base, &settings(json!({"a": 2, "b": {"y": 3, "z": 4}})));

        assert_eq!(
            Value::Object(base),
            json!({"a": 2, "b": {"x": 1, "y": 3, "z": 4}})
        );
    }

    #[test]
    fn test_merge_deep_replaces_arrays() {
        let mut base = settings(json!({"list": [1, 2, 3]}));
        merge_deep(&mut base, &settings(json!({"list": [4]})));

        assert_eq!(Value::Object(base), json!({"list": [4]}));
    }

    #[test]
    fn test_merge_deep_map_replaces_scalar() {
        let mut base = settings(json!({"a": 1}));
        merge_deep(&mut base, &settings(json!({"a": {"nested": true}})));

        assert_eq!(Value::Object(base), json!({"a": {"nested": true}}));
    }

    #[test]
    fn test_diff_keeps_only_changes() {
        let left = settings(json!({"a": 1, "b": {"x": 1, "y": 5}, "c": "new"}));
        let right = settings(json!({"a": 1, "b": {"x": 1, "y": 2}}));

        assert_eq!(Value::Object(diff(&left, &right)), json!({"b": {"y": 5}, "c": "new"}));
    }

    #[test]
    fn test_diff_ignores_key_order() {
        let left = settings(json!({"b": {"y": 2, "x": 1}, "a": 1}));
        let right = settings(json!({"a": 1, "b": {"x": 1, "y": 2}}));

        assert!(diff(&left, &right).is_empty());
    }

    #[test]
    fn test_diff_of_merge_recovers_overrides() {
        let defaults = settings(json!({"id": "p", "weight": 0, "settings": {"a": true, "b": "x"}}));
        let overrides = settings(json!({"weight": 5, "settings": {"b": "y"}}));

        let effective = merged(&defaults, &overrides);

        assert_eq!(diff(&effective, &defaults), overrides);
    }

    #[test]
    fn test_without_nulls_recurses() {
        let input = settings(json!({"a": null, "b": {"c": null, "d": 1}}));

        assert_eq!(Value::Object(without_nulls(&input)), json!({"b": {"d": 1}}));
    }

    #[test]
    fn test_from_toml_table() {
        let table: toml::Table = toml::from_str(
            r#"
smart = true
level = 2
tags = ["a", "b"]
[nested]
ratio = 0.5
"#,
        )
        .unwrap();

        assert_eq!(
            Value::Object(from_toml_table(&table)),
            json!({"smart": true, "level": 2, "tags": ["a", "b"], "nested": {"ratio": 0.5}})
        );
    }

    #[test]
    fn test_canonical_string_sorts_keys() {
        let a = json!({"b": 1, "a": {"d": [1, {"z": 1, "y": 2}], "c": null}});
        let b = json!({"a": {"c": null, "d": [1, {"y": 2, "z": 1}]}, "b": 1});

        assert_eq!(canonical_string(&a), canonical_string(&b));
        assert_eq!(
            canonical_string(&a),
            r#"{"a":{"c":null,"d":[1,{"y":2,"z":1}]},"b":1}"#
        );
    }
}

//! Environment variable expansion for configuration strings.
//!
//! Supports:
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Bare `$VAR` is left alone so settings such as regular expressions or
//! currency symbols survive untouched.

use serde_json::Value;

use crate::ConfigError;

/// Expand environment variable references in a string.
///
/// Returns the input unchanged if it contains no `${`.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, LookupError> {
        match std::env::var(var) {
            Ok(val) => Ok(Some(val)),
            Err(_) => Err(LookupError {
                var_name: var.to_owned(),
            }),
        }
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{0}}} not set", e.cause.var_name),
    })
}

/// Expand every string inside a plugin override tree.
///
/// `field` is the dotted path of `value`, extended per key for error
/// messages (e.g. `parsers.commonmark.settings.base_url`).
pub(crate) fn expand_value(value: &mut Value, field: &str) -> Result<(), ConfigError> {
    match value {
        Value::String(s) => {
            *s = expand_env(s, field)?;
        }
        Value::Array(items) => {
            for (idx, item) in items.iter_mut().enumerate() {
                expand_value(item, &format!("{field}[{idx}]"))?;
            }
        }
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                expand_value(item, &format!("{field}.{key}"))?;
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

/// Error returned when environment variable lookup fails.
struct LookupError {
    var_name: String,
}

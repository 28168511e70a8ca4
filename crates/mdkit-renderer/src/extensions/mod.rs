//! Built-in extensions.
//!
//! Each extension is created from its configured plugin instance by the
//! constructor registered in [`Catalog::builtin`](crate::Catalog::builtin):
//!
//! | Extension | Roles |
//! |---|---|
//! | [`Typographer`] | settings, inline processor |
//! | [`HeadingAnchors`] | document processor |
//! | [`Admonitions`] | block parser, block renderer |
//! | [`Kbd`] | inline parser, inline renderer |
//! | [`Attributes`] | environment-aware (registers [`AttributeProcessor`]) |
//! | [`Flags`] | settings (`tables`, `strikethrough`) |

mod admonitions;
mod attributes;
mod flags;
mod heading_anchors;
mod kbd;
mod typographer;

pub use admonitions::Admonitions;
pub use attributes::{AttributeProcessor, Attributes};
pub use flags::Flags;
pub use heading_anchors::HeadingAnchors;
pub use kbd::Kbd;
pub use typographer::Typographer;

use mdkit_plugin::Settings;
use serde_json::Value;

/// Boolean setting, `default` when absent or not a boolean.
fn bool_setting(settings: &Settings, key: &str, default: bool) -> bool {
    settings.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// String setting, `default` when absent or not a string.
fn str_setting<'a>(settings: &'a Settings, key: &str, default: &'a str) -> &'a str {
    settings.get(key).and_then(Value::as_str).unwrap_or(default)
}

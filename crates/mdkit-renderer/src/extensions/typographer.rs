//! Typographic replacements in text.
//!
//! `--` and `---` become en and em dashes, `...` an ellipsis, and straight
//! quotes curly ones. A quote opens after whitespace, an opening bracket,
//! a dash or another opening quote, and closes otherwise. Code and raw HTML
//! are never touched.

use std::sync::Arc;

use mdkit_plugin::Settings;
use serde_json::Value;

use super::bool_setting;
use crate::capability::{Capability, Extension, InlineProcessor, SettingsProvider};
use crate::node::{Node, kind};

/// Configuration namespace of the extension.
const NAMESPACE: &str = "typographer";

/// Smart punctuation as an inline processor.
#[derive(Debug, Clone, Default)]
pub struct Typographer {
    settings: Settings,
}

impl Typographer {
    /// Create the extension with its instance settings (`dashes`,
    /// `ellipses`, `quotes`).
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

#[derive(Debug, Clone, Copy)]
struct Replacements {
    dashes: bool,
    ellipses: bool,
    quotes: bool,
}

impl Replacements {
    fn from_config(config: &Settings) -> Self {
        let empty = Settings::new();
        let settings = match config.get(NAMESPACE) {
            Some(Value::Object(settings)) => settings,
            _ => &empty,
        };
        Self {
            dashes: bool_setting(settings, "dashes", true),
            ellipses: bool_setting(settings, "ellipses", true),
            quotes: bool_setting(settings, "quotes", true),
        }
    }

    fn apply(self, text: &str, previous: &mut Option<char>) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;

        while i < chars.len() {
            let next = |offset: usize| chars.get(i + offset).copied();
            let (replacement, width) = match chars[i] {
                '-' if self.dashes && next(1) == Some('-') => {
                    if next(2) == Some('-') {
                        ('\u{2014}', 3)
                    } else {
                        ('\u{2013}', 2)
                    }
                }
                '.' if self.ellipses && next(1) == Some('.') && next(2) == Some('.') => {
                    ('\u{2026}', 3)
                }
                '"' if self.quotes => (
                    if opens(*previous) { '\u{201c}' } else { '\u{201d}' },
                    1,
                ),
                '\'' if self.quotes => (
                    if opens(*previous) { '\u{2018}' } else { '\u{2019}' },
                    1,
                ),
                c => (c, 1),
            };
            out.push(replacement);
            *previous = Some(replacement);
            i += width;
        }

        out
    }
}

/// Whether a quote after `previous` opens.
fn opens(previous: Option<char>) -> bool {
    previous.is_none_or(|c| {
        c.is_whitespace() || matches!(c, '(' | '[' | '{' | '-' | '\u{2013}' | '\u{2014}' | '\u{201c}' | '\u{2018}')
    })
}

impl SettingsProvider for Typographer {
    fn settings(&self) -> Settings {
        let mut fragment = Settings::new();
        fragment.insert(NAMESPACE.to_owned(), Value::Object(self.settings.clone()));
        fragment
    }
}

impl InlineProcessor for Typographer {
    fn process(&self, inlines: &mut Vec<Node>, config: &Settings) {
        let replacements = Replacements::from_config(config);
        let mut previous = None;

        for node in inlines.iter_mut() {
            match node.kind.as_str() {
                kind::TEXT => {
                    if let Some(literal) = &node.literal {
                        node.literal = Some(replacements.apply(literal, &mut previous));
                    }
                }
                kind::SOFT_BREAK | kind::HARD_BREAK => previous = Some('\n'),
                _ => {
                    if let Some(last) = node.text_content().chars().last() {
                        previous = Some(last);
                    }
                }
            }
        }
    }
}

impl Extension for Typographer {
    fn capabilities(&self) -> &[Capability] {
        &[Capability::Settings, Capability::InlineProcessor]
    }

    fn as_settings_provider(self: Arc<Self>) -> Option<Arc<dyn SettingsProvider>> {
        Some(self)
    }

    fn as_inline_processor(self: Arc<Self>) -> Option<Arc<dyn InlineProcessor>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::backend::CommonMarkBackend;
    use crate::convert::convert;
    use crate::environment::{Environment, EnvironmentBuilder};

    static_assertions::assert_impl_all!(super::Typographer: Send, Sync);

    fn environment(settings: Value) -> Environment {
        let settings = match settings {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let mut builder = EnvironmentBuilder::new(
            "commonmark",
            Arc::new(CommonMarkBackend::new("commonmark")),
            Settings::new(),
        );
        builder
            .attach("typographer", Arc::new(Typographer::new(settings)))
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_replacements() {
        let replacements = Replacements {
            dashes: true,
            ellipses: true,
            quotes: true,
        };
        let mut previous = None;

        assert_eq!(
            replacements.apply(r#"He said "it's -- fine..." --- ok"#, &mut previous),
            "He said \u{201c}it\u{2019}s \u{2013} fine\u{2026}\u{201d} \u{2014} ok"
        );
        assert_eq!(previous, Some('k'));
    }

    #[test]
    fn test_nested_quotes_open() {
        let replacements = Replacements {
            dashes: false,
            ellipses: false,
            quotes: true,
        };

        assert_eq!(
            replacements.apply(r#""'a'""#, &mut None),
            "\u{201c}\u{2018}a\u{2019}\u{201d}"
        );
    }

    #[test]
    fn test_settings_namespaced() {
        let environment = environment(json!({"dashes": false}));

        assert_eq!(
            Value::Object(environment.config().clone()),
            json!({"typographer": {"dashes": false}})
        );
        assert_eq!(
            convert("a -- b...", &environment).unwrap(),
            "<p>a -- b\u{2026}</p>"
        );
    }

    #[test]
    fn test_code_untouched() {
        let environment = environment(json!({}));

        assert_eq!(
            convert("`a -- b` then \"x\"", &environment).unwrap(),
            "<p><code>a -- b</code> then \u{201c}x\u{201d}</p>"
        );
    }
}

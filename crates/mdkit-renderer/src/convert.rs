//! Conversion facade.

use crate::backend::BackendError;
use crate::environment::Environment;
use crate::sanitize;

/// Convert markdown to sanitized HTML with the environment's default locale.
///
/// Whitespace-only input returns an empty string without invoking the
/// backend. Backend errors are returned unchanged.
///
/// ```
/// use std::sync::Arc;
/// use mdkit_plugin::Settings;
/// use mdkit_renderer::{CommonMarkBackend, EnvironmentBuilder, convert};
///
/// let environment = EnvironmentBuilder::new(
///     "commonmark",
///     Arc::new(CommonMarkBackend::new("commonmark")),
///     Settings::new(),
/// )
/// .build();
///
/// assert_eq!(convert("*hi*", &environment).unwrap(), "<p><em>hi</em></p>");
/// assert_eq!(convert("  \n", &environment).unwrap(), "");
/// ```
pub fn convert(text: &str, environment: &Environment) -> Result<String, BackendError> {
    convert_with_locale(text, environment.locale(), environment)
}

/// Convert markdown to sanitized HTML for a specific locale.
pub fn convert_with_locale(
    text: &str,
    locale: &str,
    environment: &Environment,
) -> Result<String, BackendError> {
    if text.trim().is_empty() {
        return Ok(String::new());
    }
    let html = environment.parser().parse(text, locale, environment)?;
    Ok(sanitize::filter_admin(&html).trim().to_owned())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mdkit_plugin::Settings;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::backend::{CommonMarkBackend, ParseContext, ParserBackend};
    use crate::environment::EnvironmentBuilder;
    use crate::node::Node;

    struct Failing;

    impl ParserBackend for Failing {
        fn id(&self) -> &str {
            "failing"
        }

        fn parse_document(&self, _text: &str, _context: &ParseContext<'_>) -> Result<Node, BackendError> {
            Err(BackendError::new("failing", "boom"))
        }
    }

    fn environment(backend: Arc<dyn ParserBackend>) -> Environment {
        EnvironmentBuilder::new(backend.id().to_owned(), backend, Settings::new()).build()
    }

    #[test]
    fn test_output_is_sanitized_and_trimmed() {
        let environment = environment(Arc::new(CommonMarkBackend::new("commonmark")));

        let html = convert("\n\n<script>x()</script>\n\n[a](javascript:y)\n", &environment).unwrap();

        assert_eq!(html, "x()\n<p><a>a</a></p>");
    }

    #[test]
    fn test_whitespace_input_skips_backend() {
        let environment = environment(Arc::new(Failing));

        assert_eq!(convert(" \t\n", &environment), Ok(String::new()));
    }

    #[test]
    fn test_backend_error_propagates() {
        let environment = environment(Arc::new(Failing));

        assert_eq!(
            convert("text", &environment),
            Err(BackendError::new("failing", "boom"))
        );
    }
}

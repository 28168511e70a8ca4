//! `mdkit config` command implementation.

use std::path::Path;

use clap::Args;
use mdkit_config::Config;
use mdkit_renderer::{Catalog, Markdown};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the config command.
#[derive(Args)]
pub(crate) struct ConfigArgs {
    /// Plugin id.
    id: String,

    /// Look the id up among extensions instead of parsers.
    #[arg(short, long)]
    extension: bool,
}

impl ConfigArgs {
    /// Execute the config command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the id is unknown.
    pub(crate) fn execute(self, config_path: Option<&Path>) -> Result<(), CliError> {
        let config = Config::load(config_path, None)?;
        let markdown = Markdown::new(Catalog::builtin(), config);

        let json = configuration_json(&markdown, &self.id, self.extension)?;
        Output::new().document(&json)?;
        Ok(())
    }
}

/// Pretty JSON of the plugin's persistable configuration.
fn configuration_json(markdown: &Markdown, id: &str, extension: bool) -> Result<String, CliError> {
    let instance = if extension {
        markdown.extensions().get_strict(id)?;
        markdown.extension(id)
    } else {
        markdown.parsers().get_strict(id)?;
        markdown.parser(id)
    };
    Ok(serde_json::to_string_pretty(&instance.sorted_configuration())?)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn markdown(toml: &str) -> Markdown {
        let config = Config::from_toml_str(toml, Path::new(".")).unwrap();
        Markdown::new(Catalog::builtin(), config)
    }

    #[test]
    fn test_extension_configuration() {
        let markdown = markdown("[extensions.typographer]\nenabled = true\nsettings = { quotes = false }\n");

        let json = configuration_json(&markdown, "typographer", true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "dependencies": {},
                "enabled": true,
                "id": "typographer",
                "settings": { "quotes": false },
                "weight": 10,
            })
        );
    }

    #[test]
    fn test_parser_configuration_has_no_enabled() {
        let markdown = markdown("");

        let json = configuration_json(&markdown, "commonmark", false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value.get("enabled"), None);
        assert_eq!(value["id"], "commonmark");
    }

    #[test]
    fn test_unknown_id() {
        let markdown = markdown("");

        let err = configuration_json(&markdown, "nope", true).unwrap_err();

        assert_eq!(err.to_string(), "Unknown extension plugin: nope");
    }
}

//! `mdkit plugins` command implementation.

use std::path::Path;

use clap::Args;
use mdkit_config::Config;
use mdkit_plugin::{LibraryRequirement, PluginDefinition, PluginRegistry};
use mdkit_renderer::{Catalog, Markdown};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the plugins command.
#[derive(Args)]
pub(crate) struct PluginsArgs {
    /// Include plugins whose library is not installed.
    #[arg(short, long)]
    all: bool,
}

impl PluginsArgs {
    /// Execute the plugins command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails.
    pub(crate) fn execute(self, config_path: Option<&Path>) -> Result<(), CliError> {
        let output = Output::new();
        let config = Config::load(config_path, None)?;
        let markdown = Markdown::new(Catalog::builtin(), config);
        let default_parser = markdown.default_parser_id();

        output.highlight("Parsers");
        self.print_registry(&output, markdown.parsers(), |def| def.id == default_parser);
        output.info("");
        output.highlight("Extensions");
        self.print_registry(&output, markdown.extensions(), |def| {
            markdown.extension(&def.id).is_enabled()
        });

        for invalid in markdown
            .parsers()
            .invalid()
            .into_iter()
            .chain(markdown.extensions().invalid())
        {
            output.warning(&format!("Skipped: {invalid}"));
        }
        Ok(())
    }

    fn print_registry(
        &self,
        output: &Output,
        registry: &PluginRegistry,
        active: impl Fn(&PluginDefinition) -> bool,
    ) {
        for def in registry.list(self.all) {
            let line = plugin_line(&def, active(&def));
            if def.installed {
                output.success(&line);
            } else {
                output.warning(&line);
            }
            for detail in library_lines(&def) {
                output.detail(&detail);
            }
        }
    }
}

/// `  id  Label (version)  [status]` summary line.
fn plugin_line(def: &PluginDefinition, active: bool) -> String {
    let status = match (def.installed, active) {
        (false, _) => "not installed",
        (true, true) => "active",
        (true, false) => "installed",
    };
    format!("  {:<18}{}  [{status}]", def.id, def.label_with_version(true))
}

/// One line per installable alternative, plus its requirements and, when
/// missing, where to get it.
fn library_lines(def: &PluginDefinition) -> Vec<String> {
    let installed_id = def.installed_library().map(|lib| lib.id.as_str());
    let preferred_id = def.preferred_library().map(|lib| lib.id.as_str());
    let mut lines = Vec::new();

    for (library, install) in def.libraries.iter().zip(def.available_installs()) {
        lines.push(format!(
            "      {}{}",
            install.label_with_version(true),
            library_flags(library, installed_id, preferred_id)
        ));
        for requirement in &library.requirements {
            lines.push(format!(
                "        requires {}: {}",
                requirement.kind.as_str(),
                requirement.describe()
            ));
        }
        if install.installed {
            continue;
        }
        if let Some(command) = &library.install_command {
            lines.push(format!("        install: {command}"));
        }
        if let Some(url) = &install.url {
            lines.push(format!("        see: {url}"));
        }
    }
    lines
}

fn library_flags(
    library: &LibraryRequirement,
    installed_id: Option<&str>,
    preferred_id: Option<&str>,
) -> String {
    let mut flags = Vec::new();
    if preferred_id == Some(library.id.as_str()) {
        flags.push("preferred");
    }
    if installed_id == Some(library.id.as_str()) {
        flags.push("in use");
    } else if !library.installed {
        flags.push("missing");
    }
    if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mdkit_plugin::{ManifestSource, PluginKind};
    use pretty_assertions::assert_eq;

    use super::*;

    fn builtin_parsers() -> PluginRegistry {
        Catalog::builtin().registry(PluginKind::Parser)
    }

    #[test]
    fn test_plugin_line() {
        let gfm = builtin_parsers().get("gfm");

        assert_eq!(
            plugin_line(&gfm, false),
            "  gfm               GitHub Flavored Markdown (0.13)  [installed]"
        );
    }

    #[test]
    fn test_library_lines_show_preferred_missing() {
        let gfm = builtin_parsers().get("gfm");

        assert_eq!(
            library_lines(&gfm),
            vec![
                "      comrak [preferred, missing]",
                "        requires runtime: comrak::Arena",
                "        install: cargo add comrak",
                "        see: https://crates.io/crates/comrak",
                "      pulldown-cmark (0.13) [in use]",
                "        requires runtime: pulldown_cmark::Parser",
            ]
        );
    }

    #[test]
    fn test_unlabelled_library_falls_back_to_plugin() {
        let registry = Catalog::new()
            .with_source(Arc::new(ManifestSource::new(
                "test",
                r#"
[[parser]]
id = "fancy"
label = "Fancy"
url = "https://example.com/fancy"

[[parser.libraries]]
id = "fancy_lib::Engine"
preferred = true
install_command = "cargo add fancy-lib"
"#,
            )))
            .registry(PluginKind::Parser);

        assert_eq!(
            library_lines(&registry.get("fancy")),
            vec![
                "      Fancy [preferred, missing]",
                "        install: cargo add fancy-lib",
                "        see: https://example.com/fancy",
            ]
        );
    }

    #[test]
    fn test_single_library() {
        let commonmark = builtin_parsers().get("commonmark");

        assert_eq!(
            library_lines(&commonmark),
            vec!["      pulldown-cmark (0.13) [preferred, in use]"]
        );
    }
}

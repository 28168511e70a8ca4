//! `mdkit convert` command implementation.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::Args;
use mdkit_config::{CliSettings, Config};
use mdkit_renderer::{Catalog, Markdown};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the convert command.
#[derive(Args)]
pub(crate) struct ConvertArgs {
    /// Markdown file to convert (default: read stdin).
    file: Option<PathBuf>,

    /// Parser to use (overrides config).
    #[arg(short, long)]
    parser: Option<String>,

    /// Locale passed to the parser (overrides config).
    #[arg(long)]
    locale: Option<String>,

    /// Enable an extension (repeatable).
    #[arg(long, value_name = "ID")]
    enable: Vec<String>,

    /// Disable an extension (repeatable, wins over --enable).
    #[arg(long, value_name = "ID")]
    disable: Vec<String>,
}

impl ConvertArgs {
    /// Execute the convert command.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is unavailable, configuration fails or
    /// the parser backend fails.
    pub(crate) fn execute(self, config_path: Option<&Path>) -> Result<(), CliError> {
        let text = read_source(self.file.as_deref())?;

        let cli_settings = CliSettings {
            parser: self.parser,
            locale: self.locale,
            enable: self.enable,
            disable: self.disable,
        };
        let config = Config::load(config_path, Some(&cli_settings))?;
        let markdown = Markdown::new(Catalog::builtin(), config);

        let html = markdown.convert(&text)?;
        Output::new().document(&html)?;
        Ok(())
    }
}

/// Read the file, or stdin when no file is given.
fn read_source(file: Option<&Path>) -> Result<String, CliError> {
    match file {
        Some(path) => {
            if !path.is_file() {
                return Err(CliError::SourceUnavailable(path.to_path_buf()));
            }
            Ok(std::fs::read_to_string(path)?)
        }
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

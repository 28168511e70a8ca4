//! Configuration management for mdkit.
//!
//! Parses `mdkit.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories. The file supplies
//! the host-side plugin overrides that [`overlay`] merges onto plugin
//! defaults:
//!
//! ```toml
//! [markdown]
//! default_parser = "commonmark"
//! manifests = ["plugins.toml"]
//! locale = "en"
//!
//! [parsers.commonmark]
//! weight = 2
//! settings = { smart_punctuation = true }
//!
//! [extensions.typographer]
//! enabled = true
//! ```
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `markdown.default_parser`
//! - `markdown.locale`
//! - `markdown.manifests`
//! - every string inside `[parsers.*]` and `[extensions.*]`

mod expand;
mod instance;
pub mod overlay;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mdkit_plugin::{Settings, nested};
use serde::Deserialize;
use serde_json::Value;

pub use instance::PluginInstance;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the default parser.
    pub parser: Option<String>,
    /// Override the locale passed to parsers.
    pub locale: Option<String>,
    /// Extensions to force-enable.
    pub enable: Vec<String>,
    /// Extensions to force-disable (applied after `enable`).
    pub disable: Vec<String>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "mdkit.toml";

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Conversion configuration.
    pub markdown: MarkdownConfig,
    /// Parser overrides keyed by parser id.
    parsers: BTreeMap<String, toml::Table>,
    /// Extension overrides keyed by extension id.
    extensions: BTreeMap<String, toml::Table>,

    /// Resolved parser overrides (set after loading).
    #[serde(skip)]
    parser_overrides: BTreeMap<String, Settings>,
    /// Resolved extension overrides (set after loading).
    #[serde(skip)]
    extension_overrides: BTreeMap<String, Settings>,
    /// Resolved manifest paths (set after loading).
    #[serde(skip)]
    pub manifest_paths: Vec<PathBuf>,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// `[markdown]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MarkdownConfig {
    /// Parser used when none is requested explicitly.
    pub default_parser: Option<String>,
    /// Extra manifest files, relative to the config file.
    pub manifests: Vec<String>,
    /// Locale handed to parser backends.
    pub locale: Option<String>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`markdown.default_parser`").
        field: String,
        /// Error message (e.g., "${`MDKIT_PARSER`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Validate the well-known keys of one plugin override table.
fn validate_overrides(overrides: &Settings, field: &str) -> Result<(), ConfigError> {
    match overrides.get("weight") {
        None | Some(Value::Null) => {}
        Some(value) if value.is_i64() => {}
        Some(_) => {
            return Err(ConfigError::Validation(format!(
                "{field}.weight must be an integer"
            )));
        }
    }
    match overrides.get("enabled") {
        None | Some(Value::Null | Value::Bool(_)) => {}
        Some(_) => {
            return Err(ConfigError::Validation(format!(
                "{field}.enabled must be a boolean"
            )));
        }
    }
    match overrides.get("settings") {
        None | Some(Value::Null | Value::Object(_)) => {}
        Some(_) => {
            return Err(ConfigError::Validation(format!(
                "{field}.settings must be a table"
            )));
        }
    }
    if overrides.contains_key("id") {
        return Err(ConfigError::Validation(format!(
            "{field}.id cannot be overridden"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `mdkit.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// Relative manifest paths are resolved against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns error if parsing, expansion or validation fails.
    pub fn from_toml_str(content: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;
        config.resolve(base_dir);

        // Validate configuration after loading and resolution
        config.validate()?;

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    pub fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(parser) = &settings.parser {
            self.markdown.default_parser = Some(parser.clone());
        }
        if let Some(locale) = &settings.locale {
            self.markdown.locale = Some(locale.clone());
        }
        for id in &settings.enable {
            self.extension_overrides
                .entry(id.clone())
                .or_default()
                .insert("enabled".to_owned(), Value::Bool(true));
        }
        for id in &settings.disable {
            self.extension_overrides
                .entry(id.clone())
                .or_default()
                .insert("enabled".to_owned(), Value::Bool(false));
        }
    }

    /// Configured default parser id, if any.
    #[must_use]
    pub fn default_parser(&self) -> Option<&str> {
        self.markdown.default_parser.as_deref()
    }

    /// Configured locale, if any.
    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.markdown.locale.as_deref()
    }

    /// Host overrides for a parser (empty if none configured).
    #[must_use]
    pub fn parser_overrides(&self, id: &str) -> Settings {
        self.parser_overrides.get(id).cloned().unwrap_or_default()
    }

    /// Host overrides for an extension (empty if none configured).
    #[must_use]
    pub fn extension_overrides(&self, id: &str) -> Settings {
        self.extension_overrides.get(id).cloned().unwrap_or_default()
    }

    /// Ids of extensions with configured overrides.
    pub fn configured_extensions(&self) -> impl Iterator<Item = &str> {
        self.extension_overrides.keys().map(String::as_str)
    }

    /// Set overrides for a parser, replacing any loaded ones.
    pub fn set_parser_overrides(&mut self, id: impl Into<String>, overrides: Settings) {
        self.parser_overrides.insert(id.into(), overrides);
    }

    /// Set overrides for an extension, replacing any loaded ones.
    pub fn set_extension_overrides(&mut self, id: impl Into<String>, overrides: Settings) {
        self.extension_overrides.insert(id.into(), overrides);
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config_dir = path.parent().unwrap_or(Path::new("."));
        let mut config = Self::from_toml_str(&content, config_dir)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(parser) = &self.markdown.default_parser {
            require_non_empty(parser, "markdown.default_parser")?;
        }
        if let Some(locale) = &self.markdown.locale {
            require_non_empty(locale, "markdown.locale")?;
        }
        for (idx, manifest) in self.markdown.manifests.iter().enumerate() {
            require_non_empty(manifest, &format!("markdown.manifests[{idx}]"))?;
        }
        for (id, overrides) in &self.parser_overrides {
            validate_overrides(overrides, &format!("parsers.{id}"))?;
            if overrides.contains_key("enabled") {
                return Err(ConfigError::Validation(format!(
                    "parsers.{id}.enabled is not supported; parsers are selected with markdown.default_parser"
                )));
            }
        }
        for (id, overrides) in &self.extension_overrides {
            validate_overrides(overrides, &format!("extensions.{id}"))?;
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(parser) = &self.markdown.default_parser {
            self.markdown.default_parser =
                Some(expand::expand_env(parser, "markdown.default_parser")?);
        }
        if let Some(locale) = &self.markdown.locale {
            self.markdown.locale = Some(expand::expand_env(locale, "markdown.locale")?);
        }
        for (idx, manifest) in self.markdown.manifests.iter_mut().enumerate() {
            *manifest = expand::expand_env(manifest, &format!("markdown.manifests[{idx}]"))?;
        }

        self.parser_overrides = Self::expand_tables(&self.parsers, "parsers")?;
        self.extension_overrides = Self::expand_tables(&self.extensions, "extensions")?;
        Ok(())
    }

    /// Convert override tables to settings trees, expanding strings.
    fn expand_tables(
        tables: &BTreeMap<String, toml::Table>,
        section: &str,
    ) -> Result<BTreeMap<String, Settings>, ConfigError> {
        tables
            .iter()
            .map(|(id, table)| {
                let mut settings = nested::from_toml_table(table);
                for (key, value) in &mut settings {
                    expand::expand_value(value, &format!("{section}.{id}.{key}"))?;
                }
                Ok((id.clone(), settings))
            })
            .collect()
    }

    /// Resolve manifest paths against the config directory.
    fn resolve(&mut self, config_dir: &Path) {
        self.manifest_paths = self
            .markdown
            .manifests
            .iter()
            .map(|m| config_dir.join(m))
            .collect();
    }
}

//! Plugin manifests and definition sources.
//!
//! A manifest is a TOML document with one `[[parser]]` or `[[extension]]`
//! table per plugin:
//!
//! ```toml
//! [[parser]]
//! id = "commonmark"
//! label = "CommonMark"
//! weight = 10
//! installed = "pulldown_cmark::Parser"
//! version = "PULLDOWN_CMARK_VERSION"
//! settings = { smart_punctuation = false }
//!
//! [[parser.libraries]]
//! id = "pulldown_cmark::Parser"
//! preferred = true
//! install_command = "cargo add pulldown-cmark"
//! requirements = [{ type = "runtime", id = "pulldown_cmark::Parser" }]
//! ```
//!
//! Unknown keys are ignored. A record with a malformed field is reported as
//! an [`InvalidDefinitionError`] without affecting the other records; only an
//! unreadable or unparseable document fails the whole source.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::deferred::Deferred;
use crate::definition::{PluginKind, Requirement, RequirementKind};
use crate::nested::{self, Settings};
use crate::resolver::InvalidDefinitionError;

/// Whole-source manifest failure.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest file could not be read.
    #[error("Failed to read manifest {}: {source}", path.display())]
    Io {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Manifest is not valid TOML.
    #[error("Manifest parse error in {name}: {source}")]
    Parse {
        /// Source name.
        name: String,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },
}

/// Outcome of loading one source: per-record results.
pub type LoadedDefinitions = Vec<Result<RawDefinition, InvalidDefinitionError>>;

/// Unresolved library declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLibrary {
    /// Library id; the runtime type checked when `installed` is not declared.
    pub id: String,
    /// Display label.
    pub label: Option<String>,
    /// Whether this is the recommended library.
    pub preferred: bool,
    /// Whether to surface the library in listings.
    pub ui: bool,
    /// Sub-requirements.
    pub requirements: Vec<Requirement>,
    /// Install command (display only).
    pub install_command: Option<String>,
    /// Project URL.
    pub url: Option<String>,
    /// Declared presence.
    pub installed: Deferred<bool>,
    /// Declared version.
    pub version: Deferred<String>,
}

impl RawLibrary {
    /// Library backed by the runtime type `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            preferred: false,
            ui: true,
            requirements: Vec::new(),
            install_command: None,
            url: None,
            installed: Deferred::Unresolved,
            version: Deferred::Unresolved,
        }
    }

    /// Mark as preferred.
    #[must_use]
    pub fn preferred(mut self) -> Self {
        self.preferred = true;
        self
    }

    /// Set the declared presence.
    #[must_use]
    pub fn with_installed(mut self, installed: Deferred<bool>) -> Self {
        self.installed = installed;
        self
    }

    /// Set the declared version.
    #[must_use]
    pub fn with_version(mut self, version: Deferred<String>) -> Self {
        self.version = version;
        self
    }

    /// Add a sub-requirement.
    #[must_use]
    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }
}

/// Unresolved plugin declaration, one manifest record.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDefinition {
    /// Unique id within the family.
    pub id: String,
    /// Display label; the id when absent.
    pub label: Option<String>,
    /// Display description.
    pub description: Option<String>,
    /// Project URL.
    pub url: Option<String>,
    /// Plugin class name.
    pub class: Option<String>,
    /// Ordering weight.
    pub weight: i64,
    /// Alternative backing libraries.
    pub libraries: Vec<RawLibrary>,
    /// Declared presence.
    pub installed: Deferred<bool>,
    /// Declared version.
    pub version: Deferred<String>,
    /// Declared settings; `None` leaves the class defaults alone.
    pub settings: Option<Settings>,
    /// Compatible parser ids.
    pub parsers: Vec<String>,
    /// Whether to surface the plugin in listings.
    pub ui: bool,
    /// Whether this plugin is itself a preferred alternative.
    pub preferred: bool,
    /// Default `enabled` flag for extensions.
    pub enabled_by_default: bool,
}

impl RawDefinition {
    /// Declaration with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            description: None,
            url: None,
            class: None,
            weight: 0,
            libraries: Vec::new(),
            installed: Deferred::Unresolved,
            version: Deferred::Unresolved,
            settings: None,
            parsers: Vec::new(),
            ui: true,
            preferred: false,
            enabled_by_default: false,
        }
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the plugin class.
    #[must_use]
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Set the weight.
    #[must_use]
    pub fn with_weight(mut self, weight: i64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the declared presence.
    #[must_use]
    pub fn with_installed(mut self, installed: Deferred<bool>) -> Self {
        self.installed = installed;
        self
    }

    /// Set the declared version.
    #[must_use]
    pub fn with_version(mut self, version: Deferred<String>) -> Self {
        self.version = version;
        self
    }

    /// Set the declared settings.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Restrict to the given parser ids.
    #[must_use]
    pub fn with_parsers<I, S>(mut self, parsers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parsers = parsers.into_iter().map(Into::into).collect();
        self
    }

    /// Add a library alternative.
    #[must_use]
    pub fn with_library(mut self, library: RawLibrary) -> Self {
        self.libraries.push(library);
        self
    }

    /// Enable by default (extensions).
    #[must_use]
    pub fn enabled_by_default(mut self) -> Self {
        self.enabled_by_default = true;
        self
    }
}

/// A place definitions are discovered from.
pub trait DefinitionSource: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Value that changes whenever the source's content may have changed.
    fn fingerprint(&self) -> String;

    /// Load the raw definitions of one family.
    fn load(&self, kind: PluginKind) -> Result<LoadedDefinitions, ManifestError>;
}

/// Manifest held in memory.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    name: String,
    content: String,
}

impl ManifestSource {
    /// Create a source from manifest text.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

impl DefinitionSource for ManifestSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.content.as_bytes()))
    }

    fn load(&self, kind: PluginKind) -> Result<LoadedDefinitions, ManifestError> {
        parse_manifest(&self.name, &self.content, kind)
    }
}

/// Manifest read from disk on every discovery.
#[derive(Debug, Clone)]
pub struct ManifestFile {
    path: PathBuf,
    name: String,
}

impl ManifestFile {
    /// Create a source for the manifest at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    /// Manifest path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DefinitionSource for ManifestFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> String {
        match std::fs::metadata(&self.path) {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map_or(0, |d| d.as_nanos());
                format!("{}:{}:{mtime}", self.name, meta.len())
            }
            Err(_) => format!("{}:missing", self.name),
        }
    }

    fn load(&self, kind: PluginKind) -> Result<LoadedDefinitions, ManifestError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| ManifestError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_manifest(&self.name, &content, kind)
    }
}

/// Definitions supplied in code.
///
/// The caller chooses the fingerprint and must change it whenever the set
/// changes.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    fingerprint: String,
    definitions: Vec<(PluginKind, RawDefinition)>,
}

impl StaticSource {
    /// Create an empty source.
    pub fn new(name: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fingerprint: fingerprint.into(),
            definitions: Vec::new(),
        }
    }

    /// Add a parser definition.
    #[must_use]
    pub fn with_parser(mut self, definition: RawDefinition) -> Self {
        self.definitions.push((PluginKind::Parser, definition));
        self
    }

    /// Add an extension definition.
    #[must_use]
    pub fn with_extension(mut self, definition: RawDefinition) -> Self {
        self.definitions.push((PluginKind::Extension, definition));
        self
    }
}

impl DefinitionSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn load(&self, kind: PluginKind) -> Result<LoadedDefinitions, ManifestError> {
        Ok(self
            .definitions
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, def)| Ok(def.clone()))
            .collect())
    }
}

/// Manifest document as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ManifestRaw {
    parser: Vec<toml::Table>,
    extension: Vec<toml::Table>,
}

/// One record as parsed from TOML.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RecordRaw {
    id: Option<String>,
    label: Option<String>,
    description: Option<String>,
    url: Option<String>,
    class: Option<String>,
    weight: i64,
    libraries: Vec<LibraryRaw>,
    installed: Option<toml::Value>,
    version: Option<toml::Value>,
    settings: Option<toml::Table>,
    parsers: Vec<String>,
    ui: bool,
    preferred: bool,
    enabled_by_default: bool,
}

impl Default for RecordRaw {
    fn default() -> Self {
        Self {
            id: None,
            label: None,
            description: None,
            url: None,
            class: None,
            weight: 0,
            libraries: Vec::new(),
            installed: None,
            version: None,
            settings: None,
            parsers: Vec::new(),
            ui: true,
            preferred: false,
            enabled_by_default: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LibraryRaw {
    id: String,
    label: Option<String>,
    #[serde(default)]
    preferred: bool,
    #[serde(default = "default_true")]
    ui: bool,
    #[serde(default)]
    requirements: Vec<RequirementRaw>,
    install_command: Option<String>,
    url: Option<String>,
    installed: Option<toml::Value>,
    version: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct RequirementRaw {
    #[serde(rename = "type")]
    kind: String,
    id: String,
    #[serde(default)]
    constraints: toml::Table,
}

fn default_true() -> bool {
    true
}

/// Parse one family's records out of a manifest document.
///
/// # Errors
///
/// Returns [`ManifestError::Parse`] if the document is not valid TOML or its
/// top-level shape is wrong. Individual malformed records come back as
/// `Err` entries in the returned list.
pub fn parse_manifest(
    name: &str,
    content: &str,
    kind: PluginKind,
) -> Result<LoadedDefinitions, ManifestError> {
    let manifest: ManifestRaw = toml::from_str(content).map_err(|source| ManifestError::Parse {
        name: name.to_owned(),
        source,
    })?;
    let records = match kind {
        PluginKind::Parser => manifest.parser,
        PluginKind::Extension => manifest.extension,
    };
    Ok(records
        .into_iter()
        .enumerate()
        .map(|(index, table)| convert_record(kind, index, table))
        .collect())
}

fn convert_record(
    kind: PluginKind,
    index: usize,
    table: toml::Table,
) -> Result<RawDefinition, InvalidDefinitionError> {
    let fallback_id = table
        .get("id")
        .and_then(toml::Value::as_str)
        .map_or_else(|| format!("#{index}"), ToOwned::to_owned);
    let invalid = |reason: String| InvalidDefinitionError::new(kind, &fallback_id, reason);

    let record: RecordRaw = toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| invalid(e.message().to_owned()))?;
    let id = record
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| invalid("missing \"id\"".to_owned()))?;

    let installed = deferred_installed(record.installed).map_err(&invalid)?;
    let version = deferred_version(record.version).map_err(&invalid)?;
    let libraries = record
        .libraries
        .into_iter()
        .map(convert_library)
        .collect::<Result<Vec<_>, _>>()
        .map_err(&invalid)?;

    Ok(RawDefinition {
        id,
        label: record.label,
        description: record.description,
        url: record.url,
        class: record.class,
        weight: record.weight,
        libraries,
        installed,
        version,
        settings: record.settings.as_ref().map(nested::from_toml_table),
        parsers: record.parsers,
        ui: record.ui,
        preferred: record.preferred,
        enabled_by_default: record.enabled_by_default,
    })
}

fn convert_library(raw: LibraryRaw) -> Result<RawLibrary, String> {
    let requirements = raw
        .requirements
        .into_iter()
        .map(|req| {
            let kind = RequirementKind::from_name(&req.kind).ok_or_else(|| {
                format!(
                    "library \"{}\": unknown requirement type \"{}\"",
                    raw.id, req.kind
                )
            })?;
            Ok(Requirement {
                kind,
                id: req.id,
                constraints: req
                    .constraints
                    .iter()
                    .map(|(k, v)| (k.clone(), nested::from_toml(v)))
                    .collect::<BTreeMap<_, _>>(),
            })
        })
        .collect::<Result<Vec<_>, String>>()?;
    let installed = deferred_installed(raw.installed)
        .map_err(|reason| format!("library \"{}\": {reason}", raw.id))?;
    let version = deferred_version(raw.version)
        .map_err(|reason| format!("library \"{}\": {reason}", raw.id))?;

    Ok(RawLibrary {
        id: raw.id,
        label: raw.label,
        preferred: raw.preferred,
        ui: raw.ui,
        requirements,
        install_command: raw.install_command,
        url: raw.url,
        installed,
        version,
    })
}

/// `installed`: boolean literal or type name.
fn deferred_installed(value: Option<toml::Value>) -> Result<Deferred<bool>, String> {
    match value {
        None => Ok(Deferred::Unresolved),
        Some(toml::Value::Boolean(b)) => Ok(Deferred::Literal(b)),
        Some(toml::Value::String(name)) => Ok(Deferred::Reference(name)),
        Some(other) => Err(format!(
            "\"installed\" must be a boolean or a type name, found {}",
            other.type_str()
        )),
    }
}

/// `version`: literal version or a constant/callable reference.
///
/// Strings starting with a digit and TOML integers are literal versions.
/// Floats are rejected: `1.10` would read back as `1.1`.
fn deferred_version(value: Option<toml::Value>) -> Result<Deferred<String>, String> {
    match value {
        None => Ok(Deferred::Unresolved),
        Some(toml::Value::String(s)) if s.starts_with(|c: char| c.is_ascii_digit()) => {
            Ok(Deferred::Literal(s))
        }
        Some(toml::Value::String(s)) if s.is_empty() => {
            Err("\"version\" cannot be empty".to_owned())
        }
        Some(toml::Value::String(s)) => Ok(Deferred::Reference(s)),
        Some(toml::Value::Integer(i)) => Ok(Deferred::Literal(i.to_string())),
        Some(toml::Value::Float(f)) => Err(format!(
            "\"version\" = {f} is a float and loses digits, quote it as a string"
        )),
        Some(other) => Err(format!(
            "\"version\" must be a version string or a reference, found {}",
            other.type_str()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;

    const MANIFEST: &str = r#"
[[parser]]
id = "sample"
label = "Sample"
installed = true
version = "1.0"
future_field = "ignored"

[[parser]]
id = "referenced"
installed = "sample::Parser"
version = "SAMPLE_VERSION"
weight = -5
settings = { smart = true }

[[parser.libraries]]
id = "sample::Parser"
preferred = true
install_command = "cargo add sample"
requirements = [{ type = "runtime", id = "sample::Runtime", constraints = { Version = ">=1" } }]

[[extension]]
id = "bold-stars"
parsers = ["sample"]
enabled_by_default = true
"#;

    #[test]
    fn test_parse_parsers() {
        let defs = parse_manifest("test", MANIFEST, PluginKind::Parser).unwrap();

        assert_eq!(defs.len(), 2);
        let sample = defs[0].as_ref().unwrap();
        assert_eq!(sample.id, "sample");
        assert_eq!(sample.label.as_deref(), Some("Sample"));
        assert_eq!(sample.installed, Deferred::Literal(true));
        assert_eq!(sample.version, Deferred::Literal("1.0".to_owned()));
        assert_eq!(sample.settings, None);

        let referenced = defs[1].as_ref().unwrap();
        assert_eq!(referenced.weight, -5);
        assert_eq!(
            referenced.installed,
            Deferred::Reference("sample::Parser".to_owned())
        );
        assert_eq!(
            referenced.version,
            Deferred::Reference("SAMPLE_VERSION".to_owned())
        );
        assert_eq!(
            referenced.settings.clone().map(serde_json::Value::Object),
            Some(json!({"smart": true}))
        );
        let library = &referenced.libraries[0];
        assert!(library.preferred);
        assert!(library.ui);
        assert_eq!(library.install_command.as_deref(), Some("cargo add sample"));
        assert_eq!(library.requirements[0].kind, RequirementKind::Runtime);
        assert_eq!(library.requirements[0].constraints["Version"], json!(">=1"));
    }

    #[test]
    fn test_parse_extensions() {
        let defs = parse_manifest("test", MANIFEST, PluginKind::Extension).unwrap();

        assert_eq!(defs.len(), 1);
        let ext = defs[0].as_ref().unwrap();
        assert_eq!(ext.parsers, vec!["sample".to_owned()]);
        assert!(ext.enabled_by_default);
        assert!(ext.ui);
    }

    #[test]
    fn test_numeric_version_is_literal() {
        let defs = parse_manifest(
            "test",
            "[[parser]]\nid = \"a\"\nversion = 2\n",
            PluginKind::Parser,
        )
        .unwrap();

        assert_eq!(
            defs[0].as_ref().unwrap().version,
            Deferred::Literal("2".to_owned())
        );
    }

    #[test]
    fn test_invalid_record_is_isolated() {
        let content = r#"
[[parser]]
id = "bad"
installed = 3

[[parser]]
id = "good"
"#;
        let defs = parse_manifest("test", content, PluginKind::Parser).unwrap();

        let err = defs[0].as_ref().unwrap_err();
        assert_eq!(err.id, "bad");
        assert!(err.reason.contains("installed"));
        assert_eq!(defs[1].as_ref().unwrap().id, "good");
    }

    #[test]
    fn test_invalid_version_type() {
        let defs = parse_manifest(
            "test",
            "[[parser]]\nid = \"a\"\nversion = [1]\n",
            PluginKind::Parser,
        )
        .unwrap();

        assert!(defs[0].is_err());
    }

    #[test]
    fn test_float_version_rejected() {
        let defs = parse_manifest(
            "test",
            "[[parser]]\nid = \"a\"\nversion = 1.10\n\n[[parser]]\nid = \"b\"\nversion = \"1.10\"\n",
            PluginKind::Parser,
        )
        .unwrap();

        let err = defs[0].as_ref().unwrap_err();
        assert_eq!(err.id, "a");
        assert!(err.reason.contains("quote it as a string"));
        assert_eq!(
            defs[1].as_ref().unwrap().version,
            Deferred::Literal("1.10".to_owned())
        );
    }

    #[test]
    fn test_missing_id() {
        let defs = parse_manifest("test", "[[extension]]\nlabel = \"x\"\n", PluginKind::Extension)
            .unwrap();

        let err = defs[0].as_ref().unwrap_err();
        assert_eq!(err.id, "#0");
    }

    #[test]
    fn test_unknown_requirement_type() {
        let content = r#"
[[parser]]
id = "a"
[[parser.libraries]]
id = "lib"
requirements = [{ type = "planet", id = "mars" }]
"#;
        let defs = parse_manifest("test", content, PluginKind::Parser).unwrap();

        assert!(defs[0].as_ref().unwrap_err().reason.contains("planet"));
    }

    #[test]
    fn test_wrong_field_type_is_isolated() {
        let content = "[[parser]]\nid = \"a\"\nweight = \"heavy\"\n\n[[parser]]\nid = \"b\"\n";
        let defs = parse_manifest("test", content, PluginKind::Parser).unwrap();

        assert!(defs[0].is_err());
        assert!(defs[1].is_ok());
    }

    #[test]
    fn test_invalid_toml() {
        let result = parse_manifest("broken.toml", "[[parser]\n", PluginKind::Parser);

        assert!(matches!(result, Err(ManifestError::Parse { name, .. }) if name == "broken.toml"));
    }

    #[test]
    fn test_manifest_file_fingerprint_changes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[parser]]\nid = \"a\"").unwrap();
        let source = ManifestFile::new(file.path());
        let before = source.fingerprint();

        writeln!(file, "\n[[parser]]\nid = \"b\"").unwrap();
        file.flush().unwrap();

        assert_ne!(source.fingerprint(), before);
        assert_eq!(source.load(PluginKind::Parser).unwrap().len(), 2);
    }

    #[test]
    fn test_manifest_file_missing() {
        let source = ManifestFile::new("/nonexistent/plugins.toml");

        assert!(source.fingerprint().ends_with(":missing"));
        assert!(matches!(
            source.load(PluginKind::Parser),
            Err(ManifestError::Io { .. })
        ));
    }

    #[test]
    fn test_manifest_source_fingerprint_is_content_hash() {
        let a = ManifestSource::new("a", MANIFEST);
        let b = ManifestSource::new("b", MANIFEST);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_static_source_filters_kind() {
        let source = StaticSource::new("code", "v1")
            .with_parser(RawDefinition::new("p"))
            .with_extension(RawDefinition::new("e"));

        let parsers = source.load(PluginKind::Parser).unwrap();

        assert_eq!(parsers.len(), 1);
        assert_eq!(parsers[0].as_ref().unwrap().id, "p");
    }
}

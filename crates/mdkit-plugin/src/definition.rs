//! Resolved plugin definitions.
//!
//! A [`PluginDefinition`] is the immutable, fully resolved metadata for one
//! parser backend or extension. Definitions are produced by the
//! [`Resolver`](crate::Resolver) from raw manifest records and shared as
//! `Arc<PluginDefinition>` by the [`PluginRegistry`](crate::PluginRegistry).

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::nested::Settings;

/// Reserved id of the fallback definition.
pub const BROKEN_ID: &str = "_broken";

/// Plugin family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PluginKind {
    /// Markdown parser backend.
    Parser,
    /// Syntax or rendering extension for a parser.
    Extension,
}

impl PluginKind {
    /// Manifest table name for this family (`parser` or `extension`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parser => "parser",
            Self::Extension => "extension",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a [`Requirement`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementKind {
    /// Another parser plugin.
    Parser,
    /// Another extension plugin.
    Extension,
    /// A runtime symbol (type) that must be present.
    Runtime,
}

impl RequirementKind {
    /// Parse the manifest `type` value.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "parser" => Some(Self::Parser),
            "extension" => Some(Self::Extension),
            "runtime" => Some(Self::Runtime),
            _ => None,
        }
    }

    /// Manifest `type` value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parser => "parser",
            Self::Extension => "extension",
            Self::Runtime => "runtime",
        }
    }
}

/// Sub-requirement of a library.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    /// What kind of thing is required.
    pub kind: RequirementKind,
    /// Plugin id or runtime type name.
    pub id: String,
    /// Named constraints, e.g. `Version = ">=1.0"`.
    pub constraints: BTreeMap<String, Value>,
}

impl Requirement {
    /// Human-readable summary: id followed by its constraints.
    ///
    /// Constraints with an empty or `false` value render as their bare name.
    #[must_use]
    pub fn describe(&self) -> String {
        let constraints: Vec<String> = self
            .constraints
            .iter()
            .map(|(name, value)| match value {
                Value::Null | Value::Bool(false) => name.clone(),
                Value::String(s) if s.is_empty() => name.clone(),
                Value::String(s) => format!("{name}: {s}"),
                Value::Array(items) => {
                    let items: Vec<String> = items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect();
                    format!("{name}: {}", items.join(", "))
                }
                other => format!("{name}: {other}"),
            })
            .collect();
        if constraints.is_empty() {
            self.id.clone()
        } else {
            format!("{} {}", self.id, constraints.join(", "))
        }
    }
}

/// One alternative library able to back a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryRequirement {
    /// Library id; also the runtime type checked for presence.
    pub id: String,
    /// Display label.
    pub label: Option<String>,
    /// Whether this is the recommended library.
    pub preferred: bool,
    /// Whether to surface the library in listings.
    pub ui: bool,
    /// Other plugins or runtime symbols that must also be present.
    pub requirements: Vec<Requirement>,
    /// Command that installs the library (display only).
    pub install_command: Option<String>,
    /// Project URL.
    pub url: Option<String>,
    /// Resolved presence.
    pub installed: bool,
    /// Resolved version, when known.
    pub version: Option<String>,
}

impl LibraryRequirement {
    /// Label, falling back to the id.
    #[must_use]
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

/// Fully resolved plugin metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDefinition {
    /// Plugin family.
    pub kind: PluginKind,
    /// Unique id within the family.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Display description.
    pub description: Option<String>,
    /// Project URL.
    pub url: Option<String>,
    /// Plugin class name, used for hooks and factories.
    pub class: Option<String>,
    /// Ordering weight (ascending).
    pub weight: i64,
    /// Alternative backing libraries in declared order.
    pub libraries: Vec<LibraryRequirement>,
    /// Whether the plugin is usable at runtime.
    pub installed: bool,
    /// Active version, when known.
    pub version: Option<String>,
    /// Default settings (family base, class defaults, manifest).
    pub settings: Settings,
    /// Compatible parser ids; empty means all.
    pub parsers: Vec<String>,
    /// Whether to surface the plugin in listings.
    pub ui: bool,
    /// Whether this plugin is itself a preferred alternative.
    pub preferred: bool,
    /// Default value of the `enabled` flag (extensions only).
    pub enabled_by_default: bool,
}

impl PluginDefinition {
    /// The fallback definition for a family.
    ///
    /// Always constructible, never installed.
    #[must_use]
    pub fn broken(kind: PluginKind) -> Self {
        Self {
            kind,
            id: BROKEN_ID.to_owned(),
            label: "Missing plugin".to_owned(),
            description: None,
            url: None,
            class: None,
            weight: 0,
            libraries: Vec::new(),
            installed: false,
            version: None,
            settings: Settings::new(),
            parsers: Vec::new(),
            ui: false,
            preferred: false,
            enabled_by_default: false,
        }
    }

    /// Whether this is the fallback definition.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.id == BROKEN_ID
    }

    /// Whether instances carry an `enabled` flag.
    #[must_use]
    pub fn supports_enabled(&self) -> bool {
        self.kind == PluginKind::Extension
    }

    /// First library, in declared order, that is present.
    #[must_use]
    pub fn installed_library(&self) -> Option<&LibraryRequirement> {
        self.libraries.iter().find(|lib| lib.installed)
    }

    /// Library flagged preferred, or the first declared one.
    #[must_use]
    pub fn preferred_library(&self) -> Option<&LibraryRequirement> {
        self.libraries
            .iter()
            .find(|lib| lib.preferred)
            .or_else(|| self.libraries.first())
    }

    /// Whether the preferred library is the one that is present.
    #[must_use]
    pub fn is_preferred_library_installed(&self) -> bool {
        self.preferred_library().is_some_and(|lib| lib.installed)
    }

    /// Whether more than one library is declared.
    #[must_use]
    pub fn has_multiple_libraries(&self) -> bool {
        self.libraries.len() > 1
    }

    /// Label, with ` (version)` appended when requested and known.
    #[must_use]
    pub fn label_with_version(&self, with_version: bool) -> String {
        let label = if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        };
        match (&self.version, with_version) {
            (Some(version), true) if !version.is_empty() => format!("{label} ({version})"),
            _ => label.clone(),
        }
    }

    /// Whether this extension applies to the given parser.
    #[must_use]
    pub fn is_compatible_with(&self, parser_id: &str) -> bool {
        self.parsers.is_empty() || self.parsers.iter().any(|p| p == parser_id)
    }

    /// Plugin and extension ids required by the present (or preferred) library.
    ///
    /// Keyed by `parser` / `extension`, each list sorted and deduplicated.
    #[must_use]
    pub fn dependencies(&self) -> BTreeMap<&'static str, Vec<String>> {
        let mut deps: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        let library = self.installed_library().or_else(|| self.preferred_library());
        for requirement in library.iter().flat_map(|lib| &lib.requirements) {
            if requirement.kind == RequirementKind::Runtime {
                continue;
            }
            deps.entry(requirement.kind.as_str())
                .or_default()
                .push(requirement.id.clone());
        }
        for ids in deps.values_mut() {
            ids.sort();
            ids.dedup();
        }
        deps
    }

    /// One derived definition per declared library.
    ///
    /// Each has the library's identity merged over the plugin (label,
    /// url, installed, version, preferred) and no libraries of its own.
    #[must_use]
    pub fn available_installs(&self) -> Vec<PluginDefinition> {
        self.libraries
            .iter()
            .map(|lib| {
                let mut def = self.clone();
                if let Some(label) = &lib.label {
                    def.label.clone_from(label);
                }
                if lib.url.is_some() {
                    def.url.clone_from(&lib.url);
                }
                def.ui = lib.ui;
                def.installed = lib.installed;
                def.version.clone_from(&lib.version);
                def.preferred = lib.preferred;
                def.libraries = Vec::new();
                def
            })
            .collect()
    }
}

//! Plugin discovery and resolution for mdkit.
//!
//! Parser backends and extensions are declared in TOML manifests (or in
//! code) and resolved against a [`Symbols`] table into immutable
//! [`PluginDefinition`]s:
//!
//! - [`manifest`]: manifest records and [`DefinitionSource`] implementations
//! - [`Resolver`]: materializes `installed`, `version` and library presence
//! - [`PluginRegistry`]: discovery cache, lookup with `_broken` fallback and
//!   deterministic ordering
//! - [`nested`]: settings merge and diff helpers
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use mdkit_plugin::{ManifestSource, PluginKind, PluginRegistry, Symbols};
//!
//! let manifest = r#"
//! [[parser]]
//! id = "sample"
//! installed = true
//! version = "1.0"
//! "#;
//! let registry = PluginRegistry::new(PluginKind::Parser, Arc::new(Symbols::new()))
//!     .with_source(Arc::new(ManifestSource::new("inline", manifest)));
//!
//! assert_eq!(registry.first_installed_id(), "sample");
//! assert!(registry.get("missing").is_broken());
//! ```

mod deferred;
mod definition;
pub mod manifest;
pub mod nested;
mod registry;
mod resolver;
mod symbols;

pub use deferred::{Deferred, DeferredFn};
pub use definition::{
    BROKEN_ID, LibraryRequirement, PluginDefinition, PluginKind, Requirement, RequirementKind,
};
pub use manifest::{
    DefinitionSource, LoadedDefinitions, ManifestError, ManifestFile, ManifestSource,
    RawDefinition, RawLibrary, StaticSource, parse_manifest,
};
pub use nested::Settings;
pub use registry::{PluginRegistry, UnknownPluginError};
pub use resolver::{InvalidDefinitionError, Resolver};
pub use symbols::{PluginClass, Symbols, VersionFn};

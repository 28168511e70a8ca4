//! Plugin registry.
//!
//! [`PluginRegistry`] discovers raw definitions from its sources, resolves
//! them and serves lookups in a deterministic order.
//!
//! # Ordering
//!
//! Definitions are sorted by `weight` ascending, then by normalized label
//! (lower-cased, everything but `a-z0-9` removed), then by id. The order is
//! a pure function of the definition set.
//!
//! # Caching
//!
//! The discovered set is cached under a fingerprint of all source
//! fingerprints. Every lookup recomputes the fingerprint; when it changes the
//! whole set is rebuilt and the resolver cache cleared. Rebuilds run outside
//! the lock, so concurrent callers may build redundantly; the first to store
//! a set for a fingerprint wins.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use sha2::{Digest, Sha256};

use crate::definition::{BROKEN_ID, PluginDefinition, PluginKind};
use crate::manifest::{DefinitionSource, RawDefinition};
use crate::nested::Settings;
use crate::resolver::{InvalidDefinitionError, Resolver};
use crate::symbols::Symbols;

/// Strict lookup found no definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} plugin: {id}")]
pub struct UnknownPluginError {
    /// Plugin family.
    pub kind: PluginKind,
    /// Requested id.
    pub id: String,
}

/// One discovery pass.
#[derive(Debug)]
struct Discovery {
    fingerprint: String,
    definitions: Vec<Arc<PluginDefinition>>,
    by_id: HashMap<String, usize>,
    invalid: Vec<InvalidDefinitionError>,
}

/// Registry of one plugin family.
pub struct PluginRegistry {
    kind: PluginKind,
    sources: Vec<Arc<dyn DefinitionSource>>,
    resolver: Resolver,
    base_settings: Settings,
    broken: Arc<PluginDefinition>,
    state: RwLock<Option<Arc<Discovery>>>,
}

impl PluginRegistry {
    /// Create a registry with no sources.
    #[must_use]
    pub fn new(kind: PluginKind, symbols: Arc<Symbols>) -> Self {
        Self {
            kind,
            sources: Vec::new(),
            resolver: Resolver::new(symbols),
            base_settings: Settings::new(),
            broken: Arc::new(PluginDefinition::broken(kind)),
            state: RwLock::new(None),
        }
    }

    /// Add a definition source. Later sources win on duplicate ids.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn DefinitionSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Set the family's base settings.
    #[must_use]
    pub fn with_base_settings(mut self, settings: Settings) -> Self {
        self.base_settings = settings;
        self
    }

    /// Plugin family served by this registry.
    #[must_use]
    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    /// Symbol table used for resolution.
    #[must_use]
    pub fn symbols(&self) -> &Symbols {
        self.resolver.symbols()
    }

    /// All valid definitions in order, excluding the fallback.
    pub fn discover(&self) -> Vec<Arc<PluginDefinition>> {
        self.current().definitions.clone()
    }

    /// Look up a definition, falling back to the `_broken` sentinel.
    pub fn get(&self, id: &str) -> Arc<PluginDefinition> {
        match self.get_strict(id) {
            Ok(definition) => definition,
            Err(_) if id == BROKEN_ID => Arc::clone(&self.broken),
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to broken plugin");
                Arc::clone(&self.broken)
            }
        }
    }

    /// Look up a definition.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownPluginError`] if no valid definition has this id.
    pub fn get_strict(&self, id: &str) -> Result<Arc<PluginDefinition>, UnknownPluginError> {
        let discovery = self.current();
        discovery
            .by_id
            .get(id)
            .and_then(|&idx| discovery.definitions.get(idx))
            .map(Arc::clone)
            .ok_or_else(|| UnknownPluginError {
                kind: self.kind,
                id: id.to_owned(),
            })
    }

    /// Whether a valid definition has this id.
    pub fn has(&self, id: &str) -> bool {
        self.current().by_id.contains_key(id)
    }

    /// The fallback definition.
    #[must_use]
    pub fn broken(&self) -> Arc<PluginDefinition> {
        Arc::clone(&self.broken)
    }

    /// Ordered definitions; uninstalled ones only when requested.
    pub fn list(&self, include_unavailable: bool) -> Vec<Arc<PluginDefinition>> {
        if include_unavailable {
            self.discover()
        } else {
            self.installed()
        }
    }

    /// Ordered definitions, with the fallback appended when requested.
    pub fn all(&self, include_broken: bool) -> Vec<Arc<PluginDefinition>> {
        let mut definitions = self.discover();
        if include_broken {
            definitions.push(Arc::clone(&self.broken));
        }
        definitions
    }

    /// Installed definitions in order.
    pub fn installed(&self) -> Vec<Arc<PluginDefinition>> {
        self.current()
            .definitions
            .iter()
            .filter(|def| def.installed && !def.is_broken())
            .map(Arc::clone)
            .collect()
    }

    /// Id of the first installed definition, or `_broken`.
    pub fn first_installed_id(&self) -> String {
        self.current()
            .definitions
            .iter()
            .find(|def| def.installed && !def.is_broken())
            .map_or_else(|| BROKEN_ID.to_owned(), |def| def.id.clone())
    }

    /// `(id, label)` pairs in order.
    pub fn labels(&self, installed: bool, with_version: bool) -> Vec<(String, String)> {
        let definitions = if installed {
            self.installed()
        } else {
            self.discover()
        };
        definitions
            .iter()
            .map(|def| (def.id.clone(), def.label_with_version(with_version)))
            .collect()
    }

    /// Definitions compatible with the given parser, in order.
    pub fn compatible_with(&self, parser_id: &str) -> Vec<Arc<PluginDefinition>> {
        self.current()
            .definitions
            .iter()
            .filter(|def| def.is_compatible_with(parser_id))
            .map(Arc::clone)
            .collect()
    }

    /// Definitions excluded by the last discovery.
    pub fn invalid(&self) -> Vec<InvalidDefinitionError> {
        self.current().invalid.clone()
    }

    /// Drop the discovered set and resolutions.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn invalidate(&self) {
        *self.state.write().unwrap() = None;
        self.resolver.clear();
    }

    /// Current discovery, rebuilt if the sources changed.
    fn current(&self) -> Arc<Discovery> {
        let fingerprint = self.fingerprint();
        if let Some(discovery) = self.state.read().unwrap().as_ref()
            && discovery.fingerprint == fingerprint
        {
            return Arc::clone(discovery);
        }

        let start = Instant::now();
        let had_previous = self.state.read().unwrap().is_some();
        if had_previous {
            self.resolver.clear();
        }
        let built = Arc::new(self.build(fingerprint));

        let mut state = self.state.write().unwrap();
        if let Some(existing) = state.as_ref()
            && existing.fingerprint == built.fingerprint
        {
            return Arc::clone(existing);
        }
        *state = Some(Arc::clone(&built));
        tracing::info!(
            kind = %self.kind,
            definitions = built.definitions.len(),
            invalid = built.invalid.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Plugin definitions discovered"
        );
        built
    }

    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for source in &self.sources {
            hasher.update(source.name().as_bytes());
            hasher.update([0]);
            hasher.update(source.fingerprint().as_bytes());
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }

    fn build(&self, fingerprint: String) -> Discovery {
        let mut invalid = Vec::new();
        let mut raw: Vec<RawDefinition> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for source in &self.sources {
            let loaded = match source.load(self.kind) {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "Skipping plugin source");
                    continue;
                }
            };
            for entry in loaded {
                match entry {
                    Ok(def) => {
                        // Last source wins on duplicate ids.
                        if let Some(&idx) = positions.get(&def.id) {
                            tracing::debug!(id = %def.id, source = source.name(), "Plugin definition overridden");
                            raw[idx] = def;
                        } else {
                            positions.insert(def.id.clone(), raw.len());
                            raw.push(def);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(source = source.name(), error = %e, "Excluding plugin definition");
                        invalid.push(e);
                    }
                }
            }
        }

        let mut definitions = Vec::with_capacity(raw.len());
        for def in &raw {
            if def.id == BROKEN_ID {
                tracing::warn!(kind = %self.kind, "Ignoring definition using the reserved id");
                continue;
            }
            match self.resolver.resolve(self.kind, def, &self.base_settings) {
                Ok(resolved) => definitions.push(resolved),
                Err(e) => {
                    tracing::warn!(error = %e, "Excluding plugin definition");
                    invalid.push(e);
                }
            }
        }

        definitions.sort_by(|a, b| compare_definitions(a, b));
        let by_id = definitions
            .iter()
            .enumerate()
            .map(|(idx, def)| (def.id.clone(), idx))
            .collect();

        Discovery {
            fingerprint,
            definitions,
            by_id,
            invalid,
        }
    }
}

/// Lower-case and keep only `a-z0-9`.
fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

fn compare_definitions(a: &PluginDefinition, b: &PluginDefinition) -> Ordering {
    a.weight
        .cmp(&b.weight)
        .then_with(|| normalize_label(&a.label).cmp(&normalize_label(&b.label)))
        .then_with(|| a.id.cmp(&b.id))
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("kind", &self.kind)
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

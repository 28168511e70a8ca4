//! Environment cache.
//!
//! Composed environments are cached under the composition tuple: parser id,
//! ordered extension ids, their effective configurations and the locale.
//! Builds run outside the lock; when two callers build the same key
//! concurrently the first stored environment wins and the other build is
//! dropped. Invalidation is wholesale, and a build that started before an
//! invalidation is returned to its caller but never stored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use mdkit_config::PluginInstance;
use mdkit_plugin::nested;
use serde_json::Value;

use crate::compose::{ResolvedExtension, ResolvedParser};
use crate::environment::Environment;

/// Cache key for one composition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentKey {
    parser: String,
    extensions: Vec<String>,
    configuration: String,
    locale: String,
}

impl EnvironmentKey {
    /// Key for composing `parser` with `extensions` for `locale`.
    #[must_use]
    pub fn new(parser: &ResolvedParser, extensions: &[ResolvedExtension], locale: &str) -> Self {
        let instances: Vec<&PluginInstance> = extensions.iter().map(|e| &e.instance).collect();
        Self::for_instances(&parser.instance, &instances, locale)
    }

    /// Key for composing configured instances, before any backend or
    /// extension object exists.
    #[must_use]
    pub fn for_instances(parser: &PluginInstance, extensions: &[&PluginInstance], locale: &str) -> Self {
        let configurations: Vec<Value> = std::iter::once(parser)
            .chain(extensions.iter().copied())
            .map(|instance| Value::Object(instance.effective_configuration().clone()))
            .collect();
        Self {
            parser: parser.id().to_owned(),
            extensions: extensions.iter().map(|e| e.id().to_owned()).collect(),
            configuration: nested::canonical_string(&Value::Array(configurations)),
            locale: locale.to_owned(),
        }
    }

    /// Parser id.
    #[must_use]
    pub fn parser(&self) -> &str {
        &self.parser
    }

    /// Extension ids in attachment order.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// Process-wide cache of composed environments.
#[derive(Debug, Default)]
pub struct EnvironmentCache {
    entries: RwLock<HashMap<EnvironmentKey, Arc<Environment>>>,
    generation: AtomicU64,
}

impl EnvironmentCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached environment for `key`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn get(&self, key: &EnvironmentKey) -> Option<Arc<Environment>> {
        self.entries.read().unwrap().get(key).map(Arc::clone)
    }

    /// Cached environment for `key`, building it with `build` on a miss.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn get_or_build(
        &self,
        key: EnvironmentKey,
        build: impl FnOnce() -> Environment,
    ) -> Arc<Environment> {
        if let Some(environment) = self.get(&key) {
            return environment;
        }

        let generation = self.generation.load(Ordering::Acquire);
        let start = Instant::now();
        let built = Arc::new(build());

        let mut entries = self.entries.write().unwrap();
        if self.generation.load(Ordering::Acquire) != generation {
            return built;
        }
        let stored = Arc::clone(entries.entry(key).or_insert_with(|| Arc::clone(&built)));
        if Arc::ptr_eq(&stored, &built) {
            tracing::info!(
                parser = %built.parser_id(),
                extensions = built.extensions().len(),
                elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Environment composed"
            );
        }
        stored
    }

    /// Number of cached environments.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached environment.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn invalidate(&self) {
        let mut entries = self.entries.write().unwrap();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mdkit_plugin::Settings;
use serde_json::Value;

use super::str_setting;
use crate::capability::{Capability, DocumentProcessor, Extension};
use crate::node::{Node, kind};

/// Gives headings a unique `id` derived from their text.
///
/// Headings that already carry an id keep it, and their ids are reserved.
/// Duplicates get `-1`, `-2`, ... suffixes.
#[derive(Debug, Clone)]
pub struct HeadingAnchors {
    prefix: String,
    min_level: u8,
    max_level: u8,
}

impl HeadingAnchors {
    /// Create the extension with its instance settings (`prefix`,
    /// `min_level`, `max_level`).
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let level = |key: &str, default: u8| {
            settings
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|level| u8::try_from(level).ok())
                .unwrap_or(default)
                .clamp(1, 6)
        };
        Self {
            prefix: str_setting(settings, "prefix", "").to_owned(),
            min_level: level("min_level", 1),
            max_level: level("max_level", 6),
        }
    }

    fn applies_to(&self, node: &Node) -> bool {
        node.is(kind::HEADING)
            && node
                .data("level")
                .and_then(|level| level.parse::<u8>().ok())
                .is_some_and(|level| (self.min_level..=self.max_level).contains(&level))
    }
}

impl DocumentProcessor for HeadingAnchors {
    fn process(&self, document: &mut Node, _config: &Settings) {
        let mut ids = Ids::default();
        document.walk(&mut |node| {
            if node.is(kind::HEADING)
                && let Some(id) = node.attributes.get("id")
            {
                ids.reserve(id);
            }
        });

        document.walk_mut(&mut |node| {
            if !self.applies_to(node) || node.attributes.contains_key("id") {
                return;
            }
            let base = format!("{}{}", self.prefix, slugify(&node.text_content()));
            let id = ids.unique(base);
            node.attributes.insert("id".to_owned(), id);
        });
    }
}

impl Extension for HeadingAnchors {
    fn capabilities(&self) -> &[Capability] {
        &[Capability::DocumentProcessor]
    }

    fn as_document_processor(self: Arc<Self>) -> Option<Arc<dyn DocumentProcessor>> {
        Some(self)
    }
}

/// Ids handed out in one document.
#[derive(Default)]
struct Ids {
    used: HashSet<String>,
    suffixes: HashMap<String, usize>,
}

impl Ids {
    fn reserve(&mut self, id: &str) {
        self.used.insert(id.to_owned());
    }

    fn unique(&mut self, base: String) -> String {
        let base = if base.is_empty() {
            "section".to_owned()
        } else {
            base
        };
        let mut id = base.clone();
        while self.used.contains(&id) {
            let suffix = self.suffixes.entry(base.clone()).or_insert(0);
            *suffix += 1;
            id = format!("{base}-{suffix}");
        }
        self.used.insert(id.clone());
        id
    }
}

/// Lower-case ASCII slug; whitespace, `-` and `_` collapse to one dash.
fn slugify(text: &str) -> String {
    let mut result = String::new();
    let mut last_was_dash = true;

    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && (c.is_whitespace() || c == '-' || c == '_') {
            result.push('-');
            last_was_dash = true;
        }
    }

    if result.ends_with('-') {
        result.pop();
    }
    result
}

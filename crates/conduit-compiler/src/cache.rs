//! Template source caching.
//!
//! Templates are cached by source locator. A [`StaticCache`] is filled up
//! front and never changes; a [`SharedCache`] fills as templates are fetched
//! and may be shared between concurrent compiles.

use std::collections::HashMap;
use std::sync::RwLock;

pub trait TemplateCache: Send + Sync {
    fn get(&self, source: &str) -> Option<Vec<u8>>;

    /// Records a fetched template. Caches may ignore this.
    fn put(&self, source: &str, bytes: &[u8]);
}

/// A fixed set of templates.
#[derive(Debug, Clone, Default)]
pub struct StaticCache {
    entries: HashMap<String, Vec<u8>>,
}

impl StaticCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(source.into(), bytes.into());
        self
    }
}

impl TemplateCache for StaticCache {
    fn get(&self, source: &str) -> Option<Vec<u8>> {
        self.entries.get(source).cloned()
    }

    fn put(&self, _source: &str, _bytes: &[u8]) {}
}

/// A read-through cache. Entries are only ever added.
#[derive(Debug, Default)]
pub struct SharedCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl SharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TemplateCache for SharedCache {
    fn get(&self, source: &str) -> Option<Vec<u8>> {
        self.entries.read().ok()?.get(source).cloned()
    }

    fn put(&self, source: &str, bytes: &[u8]) {
        if let Ok(mut entries) = self.entries.write() {
            entries
                .entry(source.to_string())
                .or_insert_with(|| bytes.to_vec());
        }
    }
}

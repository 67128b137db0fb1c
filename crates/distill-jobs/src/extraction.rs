//! Extractor registry for dispatching source references.

use std::collections::HashMap;
use std::sync::Arc;

use distill_core::{Error, Extractor, Result, SourceKind};

/// Registry mapping source kinds to their extractor implementations.
#[derive(Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<SourceKind, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Register an extractor. Replaces any existing extractor for the same kind.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(extractor.source_kind(), extractor);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.register(extractor);
        self
    }

    /// Extractor registered for `kind`.
    pub fn resolve(&self, kind: SourceKind) -> Result<Arc<dyn Extractor>> {
        self.extractors
            .get(&kind)
            .cloned()
            .ok_or(Error::UnsupportedSource(kind))
    }

    /// List all source kinds that have registered extractors.
    pub fn available_kinds(&self) -> Vec<SourceKind> {
        let mut kinds: Vec<_> = self.extractors.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Check if an extractor is registered for the given kind.
    pub fn has_extractor(&self, kind: SourceKind) -> bool {
        self.extractors.contains_key(&kind)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

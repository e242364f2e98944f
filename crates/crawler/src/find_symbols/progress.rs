//
// find_symbols/progress.rs
//
// Streaming sinks for reference search results
//

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::finders::ReferenceLocation;
use super::symbols::SymbolInfo;

/// Terminal state of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchCompletion {
    /// At least one location was reported
    Found,
    /// The search ran to the end and found nothing
    Exhausted,
    /// The search broke off (worker disconnect, task failure). Results
    /// already reported stay valid.
    Failed,
    Cancelled,
}

/// Receives search results as they are discovered.
///
/// Results from different documents may interleave; within one document and
/// one finder they arrive in discovery order.
pub trait FindReferencesProgress: Send + Sync {
    fn on_started(&self) {}

    fn on_definition_found(&self, symbol: &SymbolInfo);

    fn on_reference_found(&self, definition: &SymbolInfo, location: &ReferenceLocation);

    /// Called exactly once per search
    fn on_completed(&self, _completion: SearchCompletion) {}
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgress;

impl FindReferencesProgress for NoOpProgress {
    fn on_definition_found(&self, _symbol: &SymbolInfo) {}

    fn on_reference_found(&self, _definition: &SymbolInfo, _location: &ReferenceLocation) {}
}

#[derive(Debug, Default)]
struct Collected {
    started: usize,
    definitions: Vec<SymbolInfo>,
    references: Vec<(SymbolInfo, ReferenceLocation)>,
    completions: Vec<SearchCompletion>,
}

/// Records every callback, for callers that want the whole result set
#[derive(Debug, Default)]
pub struct CollectingProgress {
    inner: Mutex<Collected>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Collected) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn started(&self) -> usize {
        self.with(|c| c.started)
    }

    pub fn definitions(&self) -> Vec<SymbolInfo> {
        self.with(|c| c.definitions.clone())
    }

    pub fn references(&self) -> Vec<(SymbolInfo, ReferenceLocation)> {
        self.with(|c| c.references.clone())
    }

    /// Locations reported for one definition, in arrival order
    pub fn locations_of(&self, definition: &SymbolInfo) -> Vec<ReferenceLocation> {
        self.with(|c| {
            c.references
                .iter()
                .filter(|(d, _)| d.id == definition.id)
                .map(|(_, l)| *l)
                .collect()
        })
    }

    /// Every completion signal received (exactly one for a well-behaved search)
    pub fn completions(&self) -> Vec<SearchCompletion> {
        self.with(|c| c.completions.clone())
    }

    pub fn completion(&self) -> Option<SearchCompletion> {
        self.with(|c| c.completions.last().copied())
    }
}

impl FindReferencesProgress for CollectingProgress {
    fn on_started(&self) {
        self.with(|c| c.started += 1);
    }

    fn on_definition_found(&self, symbol: &SymbolInfo) {
        self.with(|c| c.definitions.push(symbol.clone()));
    }

    fn on_reference_found(&self, definition: &SymbolInfo, location: &ReferenceLocation) {
        self.with(|c| c.references.push((definition.clone(), *location)));
    }

    fn on_completed(&self, completion: SearchCompletion) {
        self.with(|c| c.completions.push(completion));
    }
}

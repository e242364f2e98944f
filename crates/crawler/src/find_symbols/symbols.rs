//
// find_symbols/symbols.rs
//
// Symbol model consumed by reference search
//

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::snapshot::{DocumentId, SymbolId};

/// Half-open text range `[start, end)` in a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: u32,
    pub end: u32,
}

impl TextSpan {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overlap test; an empty span intersects a span that contains its position
    pub fn intersects(&self, other: &TextSpan) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Type,
    Method,
    Property,
    Field,
    Event,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    /// Document holding the declaration
    pub declaration: DocumentId,
    pub span: TextSpan,
}

/// Read access to the semantic model.
///
/// Forward relationships point from a member to the members it overrides or
/// implements; reverse relationships point back down the hierarchy.
pub trait SymbolSource: Send + Sync {
    fn symbol(&self, id: SymbolId) -> Option<SymbolInfo>;

    /// Members `id` overrides (forward)
    fn overrides(&self, id: SymbolId) -> Vec<SymbolId>;

    /// Interface members `id` implements (forward)
    fn implements(&self, id: SymbolId) -> Vec<SymbolId>;

    /// Members overriding `id` (reverse)
    fn overridden_by(&self, id: SymbolId) -> Vec<SymbolId>;

    /// Members implementing `id` (reverse)
    fn implemented_by(&self, id: SymbolId) -> Vec<SymbolId>;

    /// Reference spans of `symbol` in `document`, in document order
    fn references_in(&self, symbol: SymbolId, document: DocumentId) -> Vec<TextSpan>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relationship {
    Overrides,
    Implements,
}

/// In-memory symbol graph. Safe to extend while searches run.
#[derive(Debug, Default)]
pub struct SymbolGraph {
    symbols: DashMap<SymbolId, SymbolInfo>,
    forward: DashMap<SymbolId, Vec<(Relationship, SymbolId)>>,
    reverse: DashMap<SymbolId, Vec<(Relationship, SymbolId)>>,
    references: DashMap<(SymbolId, DocumentId), Vec<TextSpan>>,
}

impl SymbolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn add_symbol(&self, symbol: SymbolInfo) {
        self.symbols.insert(symbol.id, symbol);
    }

    /// Record that `derived` overrides `base`
    pub fn add_override(&self, derived: SymbolId, base: SymbolId) {
        self.relate(derived, Relationship::Overrides, base);
    }

    /// Record that `implementor` implements the interface member `member`
    pub fn add_implementation(&self, implementor: SymbolId, member: SymbolId) {
        self.relate(implementor, Relationship::Implements, member);
    }

    fn relate(&self, from: SymbolId, relationship: Relationship, to: SymbolId) {
        let mut forward = self.forward.entry(from).or_default();
        if forward.contains(&(relationship, to)) {
            return;
        }
        forward.push((relationship, to));
        drop(forward);
        self.reverse.entry(to).or_default().push((relationship, from));
    }

    /// Record a reference occurrence; spans are kept sorted
    pub fn add_reference(&self, symbol: SymbolId, document: DocumentId, span: TextSpan) {
        let mut spans = self.references.entry((symbol, document)).or_default();
        if let Err(pos) = spans.binary_search(&span) {
            spans.insert(pos, span);
        }
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    fn related(
        map: &DashMap<SymbolId, Vec<(Relationship, SymbolId)>>,
        id: SymbolId,
        relationship: Relationship,
    ) -> Vec<SymbolId> {
        map.get(&id)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|(r, _)| *r == relationship)
                    .map(|(_, other)| *other)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl SymbolSource for SymbolGraph {
    fn symbol(&self, id: SymbolId) -> Option<SymbolInfo> {
        self.symbols.get(&id).map(|s| s.clone())
    }

    fn overrides(&self, id: SymbolId) -> Vec<SymbolId> {
        Self::related(&self.forward, id, Relationship::Overrides)
    }

    fn implements(&self, id: SymbolId) -> Vec<SymbolId> {
        Self::related(&self.forward, id, Relationship::Implements)
    }

    fn overridden_by(&self, id: SymbolId) -> Vec<SymbolId> {
        Self::related(&self.reverse, id, Relationship::Overrides)
    }

    fn implemented_by(&self, id: SymbolId) -> Vec<SymbolId> {
        Self::related(&self.reverse, id, Relationship::Implements)
    }

    fn references_in(&self, symbol: SymbolId, document: DocumentId) -> Vec<TextSpan> {
        self.references
            .get(&(symbol, document))
            .map(|spans| spans.clone())
            .unwrap_or_default()
    }
}

//
// find_symbols/finders.rs
//
// Reference finder strategies run by the local search engine
//

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::symbols::{SymbolInfo, SymbolSource, TextSpan};
use crate::snapshot::DocumentId;

/// One located occurrence of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceLocation {
    pub document: DocumentId,
    pub span: TextSpan,
    pub is_definition: bool,
}

/// A strategy that locates occurrences of one symbol in one document.
///
/// Results are returned in discovery order.
pub trait ReferenceFinder: Send + Sync {
    fn name(&self) -> &'static str;

    fn find(
        &self,
        source: &dyn SymbolSource,
        symbol: &SymbolInfo,
        document: DocumentId,
    ) -> Vec<ReferenceLocation>;
}

/// Reports the declaration site when it lies in the searched document
#[derive(Debug, Default)]
pub struct DeclarationFinder;

impl ReferenceFinder for DeclarationFinder {
    fn name(&self) -> &'static str {
        "declaration"
    }

    fn find(
        &self,
        _source: &dyn SymbolSource,
        symbol: &SymbolInfo,
        document: DocumentId,
    ) -> Vec<ReferenceLocation> {
        if symbol.declaration != document {
            return Vec::new();
        }
        vec![ReferenceLocation {
            document,
            span: symbol.span,
            is_definition: true,
        }]
    }
}

/// Reports name references recorded by the semantic model
#[derive(Debug, Default)]
pub struct NameReferenceFinder;

impl ReferenceFinder for NameReferenceFinder {
    fn name(&self) -> &'static str {
        "name_reference"
    }

    fn find(
        &self,
        source: &dyn SymbolSource,
        symbol: &SymbolInfo,
        document: DocumentId,
    ) -> Vec<ReferenceLocation> {
        source
            .references_in(symbol.id, document)
            .into_iter()
            // The declaration finder owns the declaration site
            .filter(|span| !(symbol.declaration == document && *span == symbol.span))
            .map(|span| ReferenceLocation {
                document,
                span,
                is_definition: false,
            })
            .collect()
    }
}

/// The fixed, ordered strategy list
pub fn default_finders() -> Vec<Arc<dyn ReferenceFinder>> {
    vec![Arc::new(DeclarationFinder), Arc::new(NameReferenceFinder)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::find_symbols::symbols::{SymbolGraph, SymbolKind};
    use crate::snapshot::{ProjectId, SymbolId};

    fn setup() -> (SymbolGraph, SymbolInfo, DocumentId, DocumentId) {
        let pid = ProjectId::from_raw(1);
        let (d1, d2) = (DocumentId::from_raw(pid, 1), DocumentId::from_raw(pid, 2));
        let graph = SymbolGraph::new();
        let symbol = SymbolInfo {
            id: SymbolId::from_raw(7),
            name: "Run".into(),
            kind: SymbolKind::Method,
            declaration: d1,
            span: TextSpan::new(4, 7),
        };
        graph.add_symbol(symbol.clone());
        graph.add_reference(symbol.id, d1, TextSpan::new(4, 7));
        graph.add_reference(symbol.id, d1, TextSpan::new(30, 33));
        graph.add_reference(symbol.id, d2, TextSpan::new(2, 5));
        (graph, symbol, d1, d2)
    }

    #[test]
    fn test_declaration_finder_only_in_declaring_document() {
        let (graph, symbol, d1, d2) = setup();
        let found = DeclarationFinder.find(&graph, &symbol, d1);
        assert_eq!(found.len(), 1);
        assert!(found[0].is_definition);
        assert!(DeclarationFinder.find(&graph, &symbol, d2).is_empty());
    }

    #[test]
    fn test_name_finder_skips_declaration_site() {
        let (graph, symbol, d1, d2) = setup();
        let spans: Vec<_> = NameReferenceFinder
            .find(&graph, &symbol, d1)
            .into_iter()
            .map(|l| l.span)
            .collect();
        assert_eq!(spans, vec![TextSpan::new(30, 33)]);
        assert_eq!(NameReferenceFinder.find(&graph, &symbol, d2).len(), 1);
    }

    #[test]
    fn test_default_finder_order() {
        let names: Vec<_> = default_finders().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["declaration", "name_reference"]);
    }
}

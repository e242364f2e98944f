//
// find_symbols/cascade.rs
//
// Expansion of a search symbol along override/implementation relationships
//

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::symbols::{SymbolInfo, SymbolSource};
use crate::snapshot::{DocumentId, SymbolId};

/// How cascading walks the symbol hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CascadeDirection {
    /// Follow relationships up and down, switching direction freely
    #[default]
    Bidirectional,
    /// Keep walking in the direction first taken from the starting symbol.
    /// With a document restriction, downward steps stay inside it.
    Unidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindReferencesSearchOptions {
    /// Whether to cascade at all
    pub cascade: bool,
    pub direction: CascadeDirection,
}

impl Default for FindReferencesSearchOptions {
    fn default() -> Self {
        Self {
            cascade: true,
            direction: CascadeDirection::Bidirectional,
        }
    }
}

impl FindReferencesSearchOptions {
    pub fn with_direction(self, direction: CascadeDirection) -> Self {
        Self { direction, ..self }
    }

    pub fn unidirectional(self) -> Self {
        self.with_direction(CascadeDirection::Unidirectional)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    Both,
    Up,
    Down,
}

impl Walk {
    fn goes_up(self) -> bool {
        matches!(self, Walk::Both | Walk::Up)
    }

    fn goes_down(self) -> bool {
        matches!(self, Walk::Both | Walk::Down)
    }
}

/// Symbols a search for `start` covers, starting symbol first, then in
/// breadth-first discovery order.
///
/// `documents` is the search restriction, if any. In unidirectional mode a
/// reverse relationship is only followed to symbols declared inside it.
pub fn cascade_symbols(
    source: &dyn SymbolSource,
    start: &SymbolInfo,
    options: &FindReferencesSearchOptions,
    documents: Option<&HashSet<DocumentId>>,
) -> Vec<SymbolInfo> {
    let mut result = vec![start.clone()];
    if !options.cascade {
        return result;
    }

    let unidirectional = options.direction == CascadeDirection::Unidirectional;
    let mut visited: HashSet<SymbolId> = HashSet::from([start.id]);
    let mut queue: VecDeque<(SymbolId, Walk)> = VecDeque::from([(start.id, Walk::Both)]);

    while let Some((current, walk)) = queue.pop_front() {
        let mut next: Vec<(SymbolId, Walk)> = Vec::new();

        if walk.goes_up() {
            let step = if unidirectional { Walk::Up } else { Walk::Both };
            next.extend(
                source
                    .overrides(current)
                    .into_iter()
                    .chain(source.implements(current))
                    .map(|id| (id, step)),
            );
        }
        if walk.goes_down() {
            let step = if unidirectional { Walk::Down } else { Walk::Both };
            next.extend(
                source
                    .overridden_by(current)
                    .into_iter()
                    .chain(source.implemented_by(current))
                    .map(|id| (id, step)),
            );
        }

        for (id, step) in next {
            if visited.contains(&id) {
                continue;
            }
            let Some(symbol) = source.symbol(id) else {
                log::trace!("Cascade skipped unknown {}", id);
                continue;
            };
            if unidirectional && step == Walk::Down {
                if let Some(documents) = documents {
                    if !documents.contains(&symbol.declaration) {
                        log::trace!(
                            "Cascade stopped at {} ({} is outside the search documents)",
                            id,
                            symbol.declaration
                        );
                        continue;
                    }
                }
            }
            visited.insert(id);
            result.push(symbol);
            queue.push_back((id, step));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::find_symbols::symbols::{SymbolGraph, SymbolKind, TextSpan};
    use crate::snapshot::ProjectId;

    fn doc(i: u64) -> DocumentId {
        DocumentId::from_raw(ProjectId::from_raw(1), i)
    }

    fn add(graph: &SymbolGraph, id: u64, declared_in: u64) -> SymbolId {
        graph.add_symbol(SymbolInfo {
            id: SymbolId::from_raw(id),
            name: format!("M{}", id),
            kind: SymbolKind::Method,
            declaration: doc(declared_in),
            span: TextSpan::new(0, 1),
        });
        SymbolId::from_raw(id)
    }

    fn ids(symbols: &[SymbolInfo]) -> Vec<u64> {
        symbols.iter().map(|s| s.id.raw()).collect()
    }

    /// I (interface member, doc 4)
    ///   implemented by S (doc 1)
    ///     overridden by T (doc 1) and U (doc 3)
    ///   implemented by V (doc 3), a sibling of S
    fn hierarchy() -> (SymbolGraph, SymbolInfo) {
        let graph = SymbolGraph::new();
        let i = add(&graph, 1, 4);
        let s = add(&graph, 2, 1);
        let t = add(&graph, 3, 1);
        let u = add(&graph, 4, 3);
        let v = add(&graph, 5, 3);
        graph.add_implementation(s, i);
        graph.add_implementation(v, i);
        graph.add_override(t, s);
        graph.add_override(u, s);
        let start = graph.symbol(s).unwrap();
        (graph, start)
    }

    #[test]
    fn test_no_cascade_returns_start_only() {
        let (graph, start) = hierarchy();
        let options = FindReferencesSearchOptions {
            cascade: false,
            ..Default::default()
        };
        assert_eq!(ids(&cascade_symbols(&graph, &start, &options, None)), vec![2]);
    }

    #[test]
    fn test_bidirectional_reaches_siblings() {
        let (graph, start) = hierarchy();
        let options = FindReferencesSearchOptions::default();
        let found = cascade_symbols(&graph, &start, &options, None);
        assert_eq!(ids(&found), vec![2, 1, 3, 4, 5]);
    }

    #[test]
    fn test_unidirectional_never_switches_direction() {
        let (graph, start) = hierarchy();
        let options = FindReferencesSearchOptions::default().unidirectional();
        let found = cascade_symbols(&graph, &start, &options, None);
        // Up to I, down to T and U; never back down from I to V
        assert_eq!(ids(&found), vec![2, 1, 3, 4]);
    }

    #[test]
    fn test_unidirectional_respects_document_restriction() {
        let (graph, start) = hierarchy();
        let options = FindReferencesSearchOptions::default().unidirectional();
        let documents: HashSet<_> = [doc(1), doc(2)].into_iter().collect();
        let found = cascade_symbols(&graph, &start, &options, Some(&documents));
        // U lives in doc 3 and is only reachable downward
        assert_eq!(ids(&found), vec![2, 1, 3]);
    }

    #[test]
    fn test_cycles_terminate() {
        let graph = SymbolGraph::new();
        let a = add(&graph, 1, 1);
        let b = add(&graph, 2, 1);
        graph.add_override(a, b);
        graph.add_override(b, a);
        let start = graph.symbol(a).unwrap();
        let found = cascade_symbols(&graph, &start, &FindReferencesSearchOptions::default(), None);
        assert_eq!(ids(&found), vec![1, 2]);
    }
}

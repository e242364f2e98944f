//
// find_symbols/engine.rs
//
// In-process reference search
//

use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::cascade::{cascade_symbols, FindReferencesSearchOptions};
use super::finders::{default_finders, ReferenceFinder, ReferenceLocation};
use super::progress::{FindReferencesProgress, SearchCompletion};
use super::symbols::{SymbolSource, TextSpan};
use crate::error::{CrawlerError, Result};
use crate::perf::TimingGuard;
use crate::snapshot::{DocumentId, Solution, SymbolId};

/// A text range within a specific document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentSpan {
    pub document: DocumentId,
    pub span: TextSpan,
}

/// Where a search looks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    /// Every source document of the solution
    All,
    Documents(Vec<DocumentId>),
    /// Only results intersecting these spans
    Spans(Vec<DocumentSpan>),
}

impl SearchScope {
    /// Documents the cascade must stay within, if restricted
    pub fn restriction(&self) -> Option<HashSet<DocumentId>> {
        match self {
            SearchScope::All => None,
            SearchScope::Documents(documents) => Some(documents.iter().copied().collect()),
            SearchScope::Spans(spans) => Some(spans.iter().map(|s| s.document).collect()),
        }
    }

    /// Ordered search targets with their optional span filters
    fn targets(&self, solution: &Solution) -> Vec<(DocumentId, Option<Vec<TextSpan>>)> {
        let mut targets: Vec<(DocumentId, Option<Vec<TextSpan>>)> = Vec::new();
        match self {
            SearchScope::All => {
                for project in solution.projects() {
                    targets.extend(project.documents().map(|d| (d.id(), None)));
                }
            }
            SearchScope::Documents(documents) => {
                let mut seen = HashSet::new();
                for id in documents {
                    if seen.insert(*id) {
                        targets.push((*id, None));
                    }
                }
            }
            SearchScope::Spans(spans) => {
                for DocumentSpan { document, span } in spans {
                    match targets.iter_mut().find(|(d, _)| d == document) {
                        Some((_, Some(existing))) => existing.push(*span),
                        _ => targets.push((*document, Some(vec![*span]))),
                    }
                }
            }
        }

        targets.retain(|(id, _)| {
            let present = solution.contains_document(*id);
            if !present {
                log::trace!("Search skipping {}: not in solution", id);
            }
            present
        });
        targets
    }
}

/// Runs the ordered finder list over a solution snapshot.
///
/// Blocking; async callers run it on the blocking pool.
pub struct FindReferencesSearchEngine {
    solution: Arc<Solution>,
    source: Arc<dyn SymbolSource>,
    finders: Vec<Arc<dyn ReferenceFinder>>,
    options: FindReferencesSearchOptions,
}

impl FindReferencesSearchEngine {
    pub fn new(
        solution: Arc<Solution>,
        source: Arc<dyn SymbolSource>,
        options: FindReferencesSearchOptions,
    ) -> Self {
        Self {
            solution,
            source,
            finders: default_finders(),
            options,
        }
    }

    /// Search for `symbol` and its cascade, reporting through `progress`.
    ///
    /// Does not call `on_started`/`on_completed`; the caller owns the
    /// search lifecycle. Cancellation is checked before each document.
    pub fn search(
        &self,
        symbol: SymbolId,
        scope: &SearchScope,
        progress: &dyn FindReferencesProgress,
        token: &CancellationToken,
    ) -> Result<SearchCompletion> {
        let _timer = TimingGuard::with_threshold("find_references", 200);

        let Some(start) = self.source.symbol(symbol) else {
            log::trace!("Search for unknown {}: nothing to find", symbol);
            return Ok(SearchCompletion::Exhausted);
        };

        let restriction = scope.restriction();
        let symbols = cascade_symbols(
            self.source.as_ref(),
            &start,
            &self.options,
            restriction.as_ref(),
        );
        for s in &symbols {
            progress.on_definition_found(s);
        }

        let targets = scope.targets(&self.solution);
        log::trace!(
            "Searching {} symbols across {} documents",
            symbols.len(),
            targets.len()
        );

        let mut found = false;
        for (document, spans) in &targets {
            if token.is_cancelled() {
                return Err(CrawlerError::Cancelled);
            }

            // Finders run in parallel; collecting keeps finder order
            let per_finder: Vec<Vec<(usize, ReferenceLocation)>> = self
                .finders
                .par_iter()
                .map(|finder| {
                    symbols
                        .iter()
                        .enumerate()
                        .flat_map(|(index, symbol)| {
                            finder
                                .find(self.source.as_ref(), symbol, *document)
                                .into_iter()
                                .map(move |location| (index, location))
                        })
                        .collect()
                })
                .collect();

            for (index, location) in per_finder.into_iter().flatten() {
                if let Some(spans) = spans {
                    if !spans.iter().any(|s| s.intersects(&location.span)) {
                        continue;
                    }
                }
                found = true;
                progress.on_reference_found(&symbols[index], &location);
            }
        }

        Ok(if found {
            SearchCompletion::Found
        } else {
            SearchCompletion::Exhausted
        })
    }
}

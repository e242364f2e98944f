//
// find_symbols/search.rs
//
// Reference search entry points: remote worker when available, otherwise
// the in-process engine
//

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::cascade::FindReferencesSearchOptions;
use super::engine::{DocumentSpan, FindReferencesSearchEngine, SearchScope};
use super::progress::{FindReferencesProgress, SearchCompletion};
use super::symbols::{SymbolInfo, SymbolSource};
use crate::config::CrawlerConfig;
use crate::crawler::{Dispatcher, Route};
use crate::error::{CrawlerError, Result};
use crate::perf;
use crate::remote::{Operation, ReferenceMessage, RemoteClient, RemoteRequest};
use crate::snapshot::{DocumentId, ProjectId, Solution, SymbolId};

/// Symbol identity that can cross to the worker.
///
/// Paired with a snapshot checksum it addresses the symbol by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerializableSymbol {
    pub id: SymbolId,
    pub project: ProjectId,
    pub name: String,
}

impl SerializableSymbol {
    /// `None` when the declaring project is not part of `solution`; such a
    /// symbol can only be searched in process.
    pub fn try_create(symbol: &SymbolInfo, solution: &Solution) -> Option<Self> {
        let project = symbol.declaration.project();
        if !solution.contains_project(project) {
            log::trace!("{} is declared outside the solution, not serializable", symbol.id);
            return None;
        }
        Some(Self {
            id: symbol.id,
            project,
            name: symbol.name.clone(),
        })
    }
}

/// Reference search front end.
///
/// Every entry point calls `on_started` once, then `on_completed` once with
/// the final outcome, whichever path ran.
pub struct SymbolFinder {
    dispatcher: Arc<Dispatcher>,
    source: Arc<dyn SymbolSource>,
    default_options: FindReferencesSearchOptions,
}

impl SymbolFinder {
    pub fn new(dispatcher: Arc<Dispatcher>, source: Arc<dyn SymbolSource>) -> Self {
        Self {
            dispatcher,
            source,
            default_options: FindReferencesSearchOptions::default(),
        }
    }

    /// Finder whose default options follow the configured cascade direction
    pub fn from_config(
        dispatcher: Arc<Dispatcher>,
        source: Arc<dyn SymbolSource>,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            default_options: config.search_options(),
            ..Self::new(dispatcher, source)
        }
    }

    pub fn default_options(&self) -> FindReferencesSearchOptions {
        self.default_options
    }

    /// Search the whole solution with the finder's default options
    pub async fn find_all_references(
        &self,
        symbol: SymbolId,
        solution: &Arc<Solution>,
        progress: Arc<dyn FindReferencesProgress>,
        token: &CancellationToken,
    ) -> Result<SearchCompletion> {
        self.find_references(symbol, solution, progress, None, self.default_options, token)
            .await
    }

    /// Search the whole solution, or only `documents` when given
    pub async fn find_references(
        &self,
        symbol: SymbolId,
        solution: &Arc<Solution>,
        progress: Arc<dyn FindReferencesProgress>,
        documents: Option<Vec<DocumentId>>,
        options: FindReferencesSearchOptions,
        token: &CancellationToken,
    ) -> Result<SearchCompletion> {
        let scope = documents
            .clone()
            .map(SearchScope::Documents)
            .unwrap_or(SearchScope::All);
        let operation = move |symbol| Operation::FindReferences {
            symbol,
            documents,
            options,
        };
        self.run(symbol, solution, progress, scope, options, operation, token)
            .await
    }

    /// Search within document spans. Cascading is always unidirectional so
    /// the search stays inside the given documents.
    pub async fn find_references_in_documents(
        &self,
        symbol: SymbolId,
        solution: &Arc<Solution>,
        progress: Arc<dyn FindReferencesProgress>,
        documents: Vec<DocumentSpan>,
        options: FindReferencesSearchOptions,
        token: &CancellationToken,
    ) -> Result<SearchCompletion> {
        let options = options.unidirectional();
        let scope = SearchScope::Spans(documents.clone());
        let operation = move |symbol| Operation::FindReferencesInDocuments {
            symbol,
            documents,
            options,
        };
        self.run(symbol, solution, progress, scope, options, operation, token)
            .await
    }

    /// [`find_references`](Self::find_references) without asking for a worker
    pub async fn find_references_in_current_process(
        &self,
        symbol: SymbolId,
        solution: &Arc<Solution>,
        progress: Arc<dyn FindReferencesProgress>,
        documents: Option<Vec<DocumentId>>,
        options: FindReferencesSearchOptions,
        token: &CancellationToken,
    ) -> Result<SearchCompletion> {
        let scope = documents.map(SearchScope::Documents).unwrap_or(SearchScope::All);
        progress.on_started();
        let result = self
            .search_local(symbol, solution, progress.clone(), scope, options, token)
            .await;
        complete(progress.as_ref(), result)
    }

    pub async fn find_references_in_documents_in_current_process(
        &self,
        symbol: SymbolId,
        solution: &Arc<Solution>,
        progress: Arc<dyn FindReferencesProgress>,
        documents: Vec<DocumentSpan>,
        options: FindReferencesSearchOptions,
        token: &CancellationToken,
    ) -> Result<SearchCompletion> {
        progress.on_started();
        let result = self
            .search_local(
                symbol,
                solution,
                progress.clone(),
                SearchScope::Spans(documents),
                options.unidirectional(),
                token,
            )
            .await;
        complete(progress.as_ref(), result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        symbol: SymbolId,
        solution: &Arc<Solution>,
        progress: Arc<dyn FindReferencesProgress>,
        scope: SearchScope,
        options: FindReferencesSearchOptions,
        operation: impl FnOnce(SerializableSymbol) -> Operation,
        token: &CancellationToken,
    ) -> Result<SearchCompletion> {
        progress.on_started();

        if token.is_cancelled() {
            return complete(progress.as_ref(), Err(CrawlerError::Cancelled));
        }

        let serializable = self
            .source
            .symbol(symbol)
            .and_then(|info| SerializableSymbol::try_create(&info, solution));

        if let Some(serializable) = serializable {
            if let Route::Remote(client) = self.dispatcher.route(token).await {
                perf::bump(&perf::counters().remote_searches);
                let checksum = self.dispatcher.store().register(solution.clone());
                let request = RemoteRequest::new(checksum, operation(serializable));
                let result =
                    search_remote(client.as_ref(), request, progress.as_ref(), token).await;
                return complete(progress.as_ref(), result);
            }
        }

        let result = self
            .search_local(symbol, solution, progress.clone(), scope, options, token)
            .await;
        complete(progress.as_ref(), result)
    }

    async fn search_local(
        &self,
        symbol: SymbolId,
        solution: &Arc<Solution>,
        progress: Arc<dyn FindReferencesProgress>,
        scope: SearchScope,
        options: FindReferencesSearchOptions,
        token: &CancellationToken,
    ) -> Result<SearchCompletion> {
        perf::bump(&perf::counters().local_searches);
        let engine = FindReferencesSearchEngine::new(solution.clone(), self.source.clone(), options);
        let token = token.clone();
        tokio::task::spawn_blocking(move || {
            engine.search(symbol, &scope, progress.as_ref(), &token)
        })
        .await
        .map_err(|e| CrawlerError::TaskFailed(e.to_string()))?
    }
}

/// Signal the terminal state exactly once and pass the result through
fn complete(
    progress: &dyn FindReferencesProgress,
    result: Result<SearchCompletion>,
) -> Result<SearchCompletion> {
    let completion = match &result {
        Ok(completion) => *completion,
        Err(err) if err.is_cancelled() => SearchCompletion::Cancelled,
        Err(err) => {
            log::warn!("Reference search failed: {}", err);
            SearchCompletion::Failed
        }
    };
    progress.on_completed(completion);
    result
}

/// Run a search on the worker while draining its result stream.
///
/// A stream that closes without a completion message means the worker went
/// away mid-search.
async fn search_remote(
    client: &dyn RemoteClient,
    request: RemoteRequest,
    progress: &dyn FindReferencesProgress,
    token: &CancellationToken,
) -> Result<SearchCompletion> {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let invoke = client.invoke_streaming(request, sender, token);

    let receive = async {
        let mut definitions: HashMap<SymbolId, SymbolInfo> = HashMap::new();
        loop {
            let message = tokio::select! {
                _ = token.cancelled() => return None,
                message = receiver.recv() => message,
            };
            match message? {
                ReferenceMessage::DefinitionFound { symbol } => {
                    progress.on_definition_found(&symbol);
                    definitions.insert(symbol.id, symbol);
                }
                ReferenceMessage::ReferenceFound {
                    definition,
                    location,
                } => match definitions.get(&definition) {
                    Some(symbol) => progress.on_reference_found(symbol, &location),
                    None => log::warn!("Worker reported a reference for unannounced {}", definition),
                },
                ReferenceMessage::Completed { completion } => return Some(completion),
            }
        }
    };

    let (invoked, completion) = tokio::join!(invoke, receive);
    if token.is_cancelled() {
        return Err(CrawlerError::Cancelled);
    }
    invoked?;
    completion.ok_or(CrawlerError::WorkerDisconnected)
}

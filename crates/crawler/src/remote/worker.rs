//! In-process analysis worker.
//!
//! Serves [`RemoteRequest`]s from a channel the way an out-of-process worker
//! would: snapshots are resolved by checksum through the shared
//! [`SnapshotStore`], crawler events go to a [`RemoteService`], and searches
//! run the local engine while streaming results back over the caller's
//! callback channel.
//!
//! Shutting the worker down drops every outstanding reply, so callers see
//! [`CrawlerError::WorkerDisconnected`].

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::host::{RemoteClient, RemoteHost};
use super::protocol::{Operation, ReferenceMessage, RemoteRequest};
use super::store::SnapshotStore;
use crate::crawler::InvocationReasons;
use crate::error::{CrawlerError, Result};
use crate::find_symbols::{
    FindReferencesProgress, FindReferencesSearchEngine, ReferenceLocation, SearchScope,
    SymbolInfo, SymbolSource,
};
use crate::snapshot::{DocumentId, ProjectId, Solution};

/// Receiver of crawler events on the worker side
#[async_trait]
pub trait RemoteService: Send + Sync + 'static {
    async fn on_solution_event(
        &self,
        solution: Arc<Solution>,
        reasons: InvocationReasons,
        token: &CancellationToken,
    ) -> Result<()>;

    async fn on_project_event(
        &self,
        solution: Arc<Solution>,
        project: ProjectId,
        reasons: InvocationReasons,
        token: &CancellationToken,
    ) -> Result<()>;

    async fn on_document_event(
        &self,
        solution: Arc<Solution>,
        document: DocumentId,
        reasons: InvocationReasons,
        token: &CancellationToken,
    ) -> Result<()>;
}

enum WorkerCall {
    Invoke {
        request: RemoteRequest,
        token: CancellationToken,
        reply: oneshot::Sender<Result<()>>,
    },
    Stream {
        request: RemoteRequest,
        callback: mpsc::UnboundedSender<ReferenceMessage>,
        token: CancellationToken,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Forwards engine results over a search's callback channel
struct ChannelProgress {
    sender: mpsc::UnboundedSender<ReferenceMessage>,
}

impl ChannelProgress {
    fn send(&self, message: ReferenceMessage) {
        if self.sender.send(message).is_err() {
            log::trace!("Search caller went away, dropping result");
        }
    }
}

impl FindReferencesProgress for ChannelProgress {
    fn on_definition_found(&self, symbol: &SymbolInfo) {
        self.send(ReferenceMessage::DefinitionFound {
            symbol: symbol.clone(),
        });
    }

    fn on_reference_found(&self, definition: &SymbolInfo, location: &ReferenceLocation) {
        self.send(ReferenceMessage::ReferenceFound {
            definition: definition.id,
            location: *location,
        });
    }
}

struct WorkerContext {
    store: Arc<SnapshotStore>,
    service: Arc<dyn RemoteService>,
    symbols: Arc<dyn SymbolSource>,
}

impl WorkerContext {
    async fn handle(&self, call: WorkerCall, worker_token: CancellationToken) {
        let (result, reply) = match call {
            WorkerCall::Invoke {
                request,
                token,
                reply,
            } => {
                let result = tokio::select! {
                    _ = worker_token.cancelled() => return,
                    result = self.execute(request, &token) => result,
                };
                (result, reply)
            }
            WorkerCall::Stream {
                request,
                callback,
                token,
                reply,
            } => {
                let result = tokio::select! {
                    _ = worker_token.cancelled() => return,
                    result = self.execute_search(request, callback, &token) => result,
                };
                (result, reply)
            }
        };

        if let Err(e) = &result {
            if !e.is_cancelled() {
                log::warn!("Worker call failed: {}", e);
            }
        }
        if reply.send(result).is_err() {
            log::trace!("Caller stopped waiting for worker reply");
        }
    }

    async fn execute(&self, request: RemoteRequest, token: &CancellationToken) -> Result<()> {
        let solution = self.store.resolve(request.checksum)?;
        match request.operation {
            Operation::SolutionEvent { reasons } => {
                self.service.on_solution_event(solution, reasons, token).await
            }
            Operation::ProjectEvent { project, reasons } => {
                solution.required_project(project)?;
                self.service
                    .on_project_event(solution, project, reasons, token)
                    .await
            }
            Operation::DocumentEvent { document, reasons } => {
                solution.required_document(document)?;
                self.service
                    .on_document_event(solution, document, reasons, token)
                    .await
            }
            Operation::FindReferences { .. } | Operation::FindReferencesInDocuments { .. } => Err(
                CrawlerError::Remote("search requests need a callback channel".to_string()),
            ),
        }
    }

    async fn execute_search(
        &self,
        request: RemoteRequest,
        callback: mpsc::UnboundedSender<ReferenceMessage>,
        token: &CancellationToken,
    ) -> Result<()> {
        let solution = self.store.resolve(request.checksum)?;
        let (symbol, scope, options) = match request.operation {
            Operation::FindReferences {
                symbol,
                documents,
                options,
            } => (
                symbol,
                documents
                    .map(SearchScope::Documents)
                    .unwrap_or(SearchScope::All),
                options,
            ),
            Operation::FindReferencesInDocuments {
                symbol,
                documents,
                options,
            } => (symbol, SearchScope::Spans(documents), options.unidirectional()),
            _ => {
                return Err(CrawlerError::Remote(
                    "crawler events do not stream results".to_string(),
                ))
            }
        };
        solution.required_project(symbol.project)?;

        // Stops the blocking search if this call is abandoned
        let search_token = token.child_token();
        let _stop_on_drop = search_token.clone().drop_guard();

        let engine = FindReferencesSearchEngine::new(solution, self.symbols.clone(), options);
        let progress = ChannelProgress {
            sender: callback.clone(),
        };
        let completion = tokio::task::spawn_blocking(move || {
            engine.search(symbol.id, &scope, &progress, &search_token)
        })
        .await
        .map_err(|e| CrawlerError::TaskFailed(e.to_string()))??;

        if callback
            .send(ReferenceMessage::Completed { completion })
            .is_err()
        {
            log::trace!("Search caller went away before completion");
        }
        Ok(())
    }
}

/// A worker task living in this process
pub struct InProcessWorker {
    sender: mpsc::UnboundedSender<WorkerCall>,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl InProcessWorker {
    /// Start serving. Must be called within a tokio runtime.
    pub fn spawn(
        store: Arc<SnapshotStore>,
        service: Arc<dyn RemoteService>,
        symbols: Arc<dyn SymbolSource>,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let context = Arc::new(WorkerContext {
            store,
            service,
            symbols,
        });
        let handle = tokio::spawn(Self::serve(receiver, context, token.clone()));

        Arc::new(Self {
            sender,
            token,
            handle: Mutex::new(Some(handle)),
        })
    }

    async fn serve(
        mut receiver: mpsc::UnboundedReceiver<WorkerCall>,
        context: Arc<WorkerContext>,
        token: CancellationToken,
    ) {
        log::info!("In-process worker started");
        loop {
            let call = tokio::select! {
                _ = token.cancelled() => break,
                call = receiver.recv() => match call {
                    Some(call) => call,
                    None => break,
                },
            };
            let context = context.clone();
            let worker_token = token.clone();
            tokio::spawn(async move { context.handle(call, worker_token).await });
        }
        log::info!("In-process worker stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stop serving; outstanding calls fail with `WorkerDisconnected`
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Shut down and wait for the serve loop to exit
    pub async fn join(&self) {
        self.shutdown();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("In-process worker terminated abnormally: {}", e);
            }
        }
    }

    async fn call(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<()>>) -> WorkerCall,
        token: &CancellationToken,
    ) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(make(reply))
            .map_err(|_| CrawlerError::WorkerDisconnected)?;
        tokio::select! {
            _ = token.cancelled() => Err(CrawlerError::Cancelled),
            response = response => response.map_err(|_| CrawlerError::WorkerDisconnected)?,
        }
    }
}

impl Drop for InProcessWorker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[async_trait]
impl RemoteClient for InProcessWorker {
    async fn invoke(&self, request: RemoteRequest, token: &CancellationToken) -> Result<()> {
        let call_token = token.clone();
        self.call(
            move |reply| WorkerCall::Invoke {
                request,
                token: call_token,
                reply,
            },
            token,
        )
        .await
    }

    async fn invoke_streaming(
        &self,
        request: RemoteRequest,
        callback: mpsc::UnboundedSender<ReferenceMessage>,
        token: &CancellationToken,
    ) -> Result<()> {
        let call_token = token.clone();
        self.call(
            move |reply| WorkerCall::Stream {
                request,
                callback,
                token: call_token,
                reply,
            },
            token,
        )
        .await
    }
}

/// Host that hands out an attached in-process worker while it runs
#[derive(Default)]
pub struct InProcessHost {
    worker: RwLock<Option<Arc<InProcessWorker>>>,
}

impl InProcessHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker(worker: Arc<InProcessWorker>) -> Self {
        let host = Self::new();
        host.attach(worker);
        host
    }

    pub fn attach(&self, worker: Arc<InProcessWorker>) {
        *self.worker.write().unwrap_or_else(PoisonError::into_inner) = Some(worker);
    }

    pub fn detach(&self) -> Option<Arc<InProcessWorker>> {
        self.worker
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl RemoteHost for InProcessHost {
    async fn try_get_client(&self, _token: &CancellationToken) -> Option<Arc<dyn RemoteClient>> {
        let worker = self
            .worker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        if !worker.is_running() {
            return None;
        }
        Some(worker as Arc<dyn RemoteClient>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{Scope, WorkItem};
    use crate::find_symbols::{SymbolGraph, SymbolKind, TextSpan};
    use crate::snapshot::{DocumentSnapshot, ProjectSnapshot, SymbolId, WorkspaceId};
    use crate::test_utils::RecordingService;

    fn fixture() -> (Arc<Solution>, ProjectId, DocumentId) {
        let pid = ProjectId::from_raw(1);
        let did = DocumentId::from_raw(pid, 1);
        let solution = Arc::new(
            Solution::new(WorkspaceId::from_raw(1))
                .with_project(ProjectSnapshot::new(pid, "app").with_document(DocumentSnapshot::source(did, "a.cs"))),
        );
        (solution, pid, did)
    }

    #[tokio::test]
    async fn test_events_reach_the_service() {
        let (solution, pid, did) = fixture();
        let store = Arc::new(SnapshotStore::new());
        let service = Arc::new(RecordingService::new());
        let worker = InProcessWorker::spawn(store.clone(), service.clone(), SymbolGraph::shared());
        let token = CancellationToken::new();

        for (scope, reasons) in [
            (Scope::Project(pid), InvocationReasons::DOCUMENT_ADDED),
            (Scope::Document(did), InvocationReasons::DOCUMENT_OPENED),
            (Scope::WholeSolution, InvocationReasons::SOLUTION_REMOVED),
        ] {
            let item = WorkItem::new(scope, reasons, solution.clone());
            let checksum = store.register(solution.clone());
            worker
                .invoke(RemoteRequest::for_work_item(&item, checksum), &token)
                .await
                .unwrap();
        }

        let calls: Vec<_> = service.calls().into_iter().map(|c| c.scope).collect();
        assert_eq!(
            calls,
            vec![Scope::Project(pid), Scope::Document(did), Scope::WholeSolution]
        );
    }

    #[tokio::test]
    async fn test_unknown_checksum_is_rejected() {
        let (solution, pid, _) = fixture();
        let worker = InProcessWorker::spawn(
            Arc::new(SnapshotStore::new()),
            Arc::new(RecordingService::new()),
            SymbolGraph::shared(),
        );
        let request = RemoteRequest::new(
            solution.checksum(),
            Operation::ProjectEvent {
                project: pid,
                reasons: InvocationReasons::DOCUMENT_ADDED,
            },
        );
        let err = worker.invoke(request, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CrawlerError::SnapshotNotFound(_)));
    }

    #[tokio::test]
    async fn test_search_streams_and_completes() {
        let (solution, _, did) = fixture();
        let store = Arc::new(SnapshotStore::new());
        let graph = SymbolGraph::shared();
        let info = SymbolInfo {
            id: SymbolId::from_raw(3),
            name: "Go".into(),
            kind: SymbolKind::Method,
            declaration: did,
            span: TextSpan::new(0, 2),
        };
        graph.add_symbol(info.clone());
        graph.add_reference(info.id, did, TextSpan::new(9, 11));
        let worker = InProcessWorker::spawn(store.clone(), Arc::new(RecordingService::new()), graph);

        let symbol = crate::find_symbols::SerializableSymbol::try_create(&info, &solution).unwrap();
        let request = RemoteRequest::new(
            store.register(solution.clone()),
            Operation::FindReferences {
                symbol,
                documents: None,
                options: Default::default(),
            },
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        worker
            .invoke_streaming(request, tx, &CancellationToken::new())
            .await
            .unwrap();

        let mut messages = Vec::new();
        while let Some(message) = rx.recv().await {
            messages.push(message);
        }
        assert!(matches!(messages[0], ReferenceMessage::DefinitionFound { .. }));
        assert_eq!(messages.len(), 4);
        assert!(matches!(
            messages.last(),
            Some(ReferenceMessage::Completed {
                completion: crate::find_symbols::SearchCompletion::Found
            })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_callers() {
        let (solution, pid, _) = fixture();
        let store = Arc::new(SnapshotStore::new());
        let worker = InProcessWorker::spawn(store.clone(), Arc::new(RecordingService::new()), SymbolGraph::shared());
        let host = InProcessHost::with_worker(worker.clone());
        let token = CancellationToken::new();
        assert!(host.try_get_client(&token).await.is_some());

        worker.join().await;
        assert!(!worker.is_running());
        assert!(host.try_get_client(&token).await.is_none());

        let request = RemoteRequest::new(
            store.register(solution),
            Operation::ProjectEvent {
                project: pid,
                reasons: InvocationReasons::DOCUMENT_ADDED,
            },
        );
        let err = worker.invoke(request, &token).await.unwrap_err();
        assert!(matches!(err, CrawlerError::WorkerDisconnected));
        assert!(host.detach().is_some());
    }
}

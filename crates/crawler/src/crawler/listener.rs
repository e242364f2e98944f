//
// crawler/listener.rs
//
// Workspace event listener feeding the crawler queue, and the batch
// processor that diffs flushed events and hands them to the dispatcher
//

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::differ::diff_event;
use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::queue::{BatchProcessor, CoalescingWorkQueue};
use crate::config::CrawlerConfig;
use crate::error::CrawlerError;
use crate::events::{ChangeEvent, DocumentEvent, WorkspaceChange};
use crate::perf;
use crate::workspace::{Workspace, WorkspaceObserver};

/// Turns flushed event batches into remote crawler calls
pub struct CrawlerEventProcessor {
    dispatcher: Arc<Dispatcher>,
}

impl CrawlerEventProcessor {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl BatchProcessor<ChangeEvent> for CrawlerEventProcessor {
    async fn process_batch(
        &self,
        events: Vec<ChangeEvent>,
        token: &CancellationToken,
    ) -> anyhow::Result<()> {
        let Some(first) = events.first() else {
            return Ok(());
        };

        let workspace = first.workspace();
        if let Some(stray) = events.iter().find(|e| e.workspace() != workspace) {
            log::error!(
                "Batch mixes events from {} and {}",
                workspace,
                stray.workspace()
            );
            return Err(CrawlerError::WorkspaceMismatch {
                old: workspace,
                new: stray.workspace(),
            }
            .into());
        }

        let mut items = Vec::new();
        for event in &events {
            if token.is_cancelled() {
                return Err(CrawlerError::Cancelled.into());
            }
            items.extend(diff_event(event)?);
        }
        log::trace!(
            "{} events in {} produced {} work items",
            events.len(),
            workspace,
            items.len()
        );

        match self.dispatcher.dispatch(items, token).await? {
            DispatchOutcome::Delegated { sent } => {
                log::trace!("Delegated {} work items to the remote worker", sent);
            }
            DispatchOutcome::NotDelegated(items) => {
                log::trace!(
                    "No remote worker; {} work items left to local analysis",
                    items.len()
                );
            }
        }
        Ok(())
    }
}

/// Subscribes to a workspace and queues every notification as a
/// [`ChangeEvent`].
pub struct WorkspaceEventListener {
    config: CrawlerConfig,
    queue: CoalescingWorkQueue<ChangeEvent>,
    token: CancellationToken,
}

impl WorkspaceEventListener {
    /// Listener whose batches go through `dispatcher`. Must be called
    /// within a tokio runtime.
    pub fn new(
        config: CrawlerConfig,
        dispatcher: Arc<Dispatcher>,
        token: &CancellationToken,
    ) -> Arc<Self> {
        Self::with_processor(config, Arc::new(CrawlerEventProcessor::new(dispatcher)), token)
    }

    pub fn with_processor(
        config: CrawlerConfig,
        processor: Arc<dyn BatchProcessor<ChangeEvent>>,
        token: &CancellationToken,
    ) -> Arc<Self> {
        let token = token.child_token();
        let queue = CoalescingWorkQueue::new_with_limit(
            config.debounce(),
            config.max_batch_size,
            processor,
            &token,
        );
        Arc::new(Self {
            config,
            queue,
            token,
        })
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Subscribe to `workspace` unless the crawler is disabled.
    ///
    /// The subscription is released when the listener's token is cancelled.
    /// Returns whether a subscription was made.
    pub fn start_listening(self: &Arc<Self>, workspace: &Workspace) -> bool {
        if !self.config.enabled {
            log::info!("Solution crawler disabled, not listening to {}", workspace.id());
            return false;
        }

        let subscription = workspace.subscribe(self.clone());
        let token = self.token.clone();
        let workspace_id = workspace.id();
        tokio::spawn(async move {
            token.cancelled().await;
            subscription.unsubscribe();
            log::info!("Stopped listening to {}", workspace_id);
            perf::counters().log_summary();
        });

        log::info!("Listening to {}", workspace_id);
        true
    }

    pub fn pending_len(&self) -> usize {
        self.queue.pending_len()
    }

    /// Cancel the queue and release every subscription
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

impl WorkspaceObserver for WorkspaceEventListener {
    fn on_workspace_changed(&self, change: &WorkspaceChange) {
        self.queue
            .add_work(ChangeEvent::WorkspaceChanged(change.clone()));
    }

    fn on_document_opened(&self, event: &DocumentEvent) {
        self.queue.add_work(ChangeEvent::DocumentOpened(event.clone()));
    }

    fn on_document_closed(&self, event: &DocumentEvent) {
        self.queue.add_work(ChangeEvent::DocumentClosed(event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{DocumentId, DocumentSnapshot, ProjectId, ProjectSnapshot, Solution, WorkspaceId};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Capture {
        batches: Mutex<Vec<Vec<ChangeEvent>>>,
    }

    #[async_trait]
    impl BatchProcessor<ChangeEvent> for Capture {
        async fn process_batch(
            &self,
            batch: Vec<ChangeEvent>,
            _token: &CancellationToken,
        ) -> anyhow::Result<()> {
            self.batches.lock().unwrap().push(batch);
            Ok(())
        }
    }

    fn config() -> CrawlerConfig {
        CrawlerConfig {
            debounce_ms: 100,
            ..CrawlerConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_become_one_batch() {
        let capture = Arc::new(Capture::default());
        let token = CancellationToken::new();
        let listener = WorkspaceEventListener::with_processor(config(), capture.clone(), &token);
        let workspace = Workspace::new();
        assert!(listener.start_listening(&workspace));

        let pid = ProjectId::new();
        let did = DocumentId::new(pid);
        workspace
            .add_project(ProjectSnapshot::new(pid, "app").with_document(DocumentSnapshot::source(did, "a.cs")))
            .unwrap();
        workspace.open_document(did).unwrap();
        workspace.close_document(did).unwrap();
        assert_eq!(listener.pending_len(), 3);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let batches = capture.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert!(matches!(batches[0][0], ChangeEvent::WorkspaceChanged(_)));
        assert!(matches!(batches[0][1], ChangeEvent::DocumentOpened(_)));
        match &batches[0][2] {
            ChangeEvent::DocumentClosed(event) => assert_eq!(event.document_id(), did),
            other => panic!("expected DocumentClosed, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_listener_does_not_subscribe() {
        let token = CancellationToken::new();
        let config = CrawlerConfig {
            enabled: false,
            ..config()
        };
        let listener = WorkspaceEventListener::with_processor(config, Arc::new(Capture::default()), &token);
        let workspace = Workspace::new();
        assert!(!listener.start_listening(&workspace));
        assert_eq!(workspace.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_unsubscribes() {
        let token = CancellationToken::new();
        let listener = WorkspaceEventListener::with_processor(config(), Arc::new(Capture::default()), &token);
        let workspace = Workspace::new();
        listener.start_listening(&workspace);
        assert_eq!(workspace.observer_count(), 1);

        token.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(workspace.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_processor_rejects_mixed_workspaces() {
        let processor = CrawlerEventProcessor::new(Arc::new(Dispatcher::new(
            Arc::new(crate::remote::UnavailableHost),
            Arc::new(crate::remote::SnapshotStore::new()),
        )));
        let event = |ws: u64| {
            let solution = Arc::new(Solution::new(WorkspaceId::from_raw(ws)));
            ChangeEvent::WorkspaceChanged(
                WorkspaceChange::new(
                    crate::events::WorkspaceChangeKind::SolutionChanged,
                    solution.clone(),
                    solution,
                    None,
                    None,
                )
                .unwrap(),
            )
        };

        let err = processor
            .process_batch(vec![event(1), event(2)], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrawlerError>(),
            Some(CrawlerError::WorkspaceMismatch { .. })
        ));

        // Same workspace, no worker: not an error
        processor
            .process_batch(vec![event(1), event(1)], &CancellationToken::new())
            .await
            .unwrap();
    }
}

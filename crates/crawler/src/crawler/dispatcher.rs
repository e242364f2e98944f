//
// crawler/dispatcher.rs
//
// Remote-or-local routing and ordered delivery of work items
//

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::work_item::WorkItem;
use crate::config::CrawlerConfig;
use crate::error::{CrawlerError, Result};
use crate::perf;
use crate::remote::{RemoteClient, RemoteHost, RemoteRequest, SnapshotStore};

/// Where a call runs, decided per call
#[derive(Clone)]
pub enum Route {
    Remote(Arc<dyn RemoteClient>),
    Local,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Remote(_) => write!(f, "Remote"),
            Route::Local => write!(f, "Local"),
        }
    }
}

#[derive(Debug)]
pub enum DispatchOutcome {
    /// Every item reached the worker, in order
    Delegated { sent: usize },
    /// No worker; the batch comes back untouched
    NotDelegated(Vec<WorkItem>),
}

impl DispatchOutcome {
    pub fn is_delegated(&self) -> bool {
        matches!(self, DispatchOutcome::Delegated { .. })
    }
}

pub struct Dispatcher {
    host: Arc<dyn RemoteHost>,
    store: Arc<SnapshotStore>,
    prefer_remote: bool,
}

impl Dispatcher {
    pub fn new(host: Arc<dyn RemoteHost>, store: Arc<SnapshotStore>) -> Self {
        Self {
            host,
            store,
            prefer_remote: true,
        }
    }

    pub fn from_config(
        host: Arc<dyn RemoteHost>,
        store: Arc<SnapshotStore>,
        config: &CrawlerConfig,
    ) -> Self {
        Self::new(host, store).with_prefer_remote(config.prefer_remote)
    }

    /// When false, every call is routed locally without asking the host
    pub fn with_prefer_remote(mut self, prefer_remote: bool) -> Self {
        self.prefer_remote = prefer_remote;
        self
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Probe for a worker
    pub async fn route(&self, token: &CancellationToken) -> Route {
        if !self.prefer_remote {
            log::trace!("Remote dispatch disabled, routing locally");
            return Route::Local;
        }
        match self.host.try_get_client(token).await {
            Some(client) => Route::Remote(client),
            None => {
                log::trace!("No remote worker available, routing locally");
                Route::Local
            }
        }
    }

    /// Deliver a batch to the worker if there is one.
    ///
    /// A missing worker is not an error: the batch is handed back and nothing
    /// is sent.
    pub async fn dispatch(
        &self,
        batch: Vec<WorkItem>,
        token: &CancellationToken,
    ) -> Result<DispatchOutcome> {
        match self.route(token).await {
            Route::Local => {
                perf::bump(&perf::counters().batches_not_delegated);
                Ok(DispatchOutcome::NotDelegated(batch))
            }
            Route::Remote(client) => {
                let sent = self.send_sequentially(client.as_ref(), &batch, token).await?;
                Ok(DispatchOutcome::Delegated { sent })
            }
        }
    }

    /// Send items one at a time, each awaited before the next.
    ///
    /// Cancellation observed between items stops the batch; nothing after
    /// that point is sent.
    pub async fn send_sequentially(
        &self,
        client: &dyn RemoteClient,
        items: &[WorkItem],
        token: &CancellationToken,
    ) -> Result<usize> {
        for (sent, item) in items.iter().enumerate() {
            if token.is_cancelled() {
                log::trace!("Dispatch cancelled after {} of {} items", sent, items.len());
                return Err(CrawlerError::Cancelled);
            }

            let checksum = self.store.register(item.solution().clone());
            let request = RemoteRequest::for_work_item(item, checksum);
            log::trace!("Sending {} [{}] @ {}", item.scope(), item.reasons(), checksum);
            client.invoke(request, token).await?;
            perf::bump(&perf::counters().work_items_sent);
        }
        Ok(items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{InvocationReasons, Scope};
    use crate::remote::{ReferenceMessage, UnavailableHost};
    use crate::snapshot::{Solution, WorkspaceId};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Records requests; cancels `cancel_after` requests in, if set
    #[derive(Default)]
    struct Recording {
        requests: Mutex<Vec<RemoteRequest>>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    #[async_trait]
    impl RemoteClient for Recording {
        async fn invoke(&self, request: RemoteRequest, _token: &CancellationToken) -> Result<()> {
            let count = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request);
                requests.len()
            };
            if let Some((after, token)) = &self.cancel_after {
                if count == *after {
                    token.cancel();
                }
            }
            Ok(())
        }

        async fn invoke_streaming(
            &self,
            _request: RemoteRequest,
            _callback: mpsc::UnboundedSender<ReferenceMessage>,
            _token: &CancellationToken,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct Fixed(Arc<Recording>);

    #[async_trait]
    impl RemoteHost for Fixed {
        async fn try_get_client(&self, _token: &CancellationToken) -> Option<Arc<dyn RemoteClient>> {
            Some(self.0.clone())
        }
    }

    fn items(n: usize) -> Vec<WorkItem> {
        let solution = Arc::new(Solution::new(WorkspaceId::from_raw(1)));
        (0..n)
            .map(|i| {
                let reasons = if i % 2 == 0 {
                    InvocationReasons::DOCUMENT_ADDED
                } else {
                    InvocationReasons::DOCUMENT_REMOVED
                };
                WorkItem::new(Scope::WholeSolution, reasons, solution.clone())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_unavailable_worker_returns_batch() {
        let store = Arc::new(SnapshotStore::new());
        let dispatcher = Dispatcher::new(Arc::new(UnavailableHost), store.clone());
        let batch = items(3);

        let outcome = dispatcher
            .dispatch(batch.clone(), &CancellationToken::new())
            .await
            .unwrap();
        match outcome {
            DispatchOutcome::NotDelegated(returned) => assert_eq!(returned, batch),
            other => panic!("expected NotDelegated, got {:?}", other),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_items_sent_in_batch_order() {
        let client = Arc::new(Recording::default());
        let store = Arc::new(SnapshotStore::new());
        let dispatcher = Dispatcher::new(Arc::new(Fixed(client.clone())), store.clone());
        let batch = items(4);

        let outcome = dispatcher.dispatch(batch.clone(), &CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Delegated { sent: 4 }));

        let requests = client.requests.lock().unwrap().clone();
        let expected: Vec<_> = batch
            .iter()
            .map(|i| RemoteRequest::for_work_item(i, i.solution().checksum()))
            .collect();
        assert_eq!(requests, expected);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_between_items_stops_sending() {
        let token = CancellationToken::new();
        let client = Arc::new(Recording {
            requests: Mutex::new(Vec::new()),
            cancel_after: Some((2, token.clone())),
        });
        let dispatcher = Dispatcher::new(Arc::new(Fixed(client.clone())), Arc::new(SnapshotStore::new()));

        let err = dispatcher.dispatch(items(5), &token).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(client.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_prefer_remote_off_skips_host() {
        let client = Arc::new(Recording::default());
        let config = CrawlerConfig {
            prefer_remote: false,
            ..CrawlerConfig::default()
        };
        let dispatcher = Dispatcher::from_config(
            Arc::new(Fixed(client.clone())),
            Arc::new(SnapshotStore::new()),
            &config,
        );
        assert!(matches!(dispatcher.route(&CancellationToken::new()).await, Route::Local));
        let outcome = dispatcher.dispatch(items(1), &CancellationToken::new()).await.unwrap();
        assert!(!outcome.is_delegated());
        assert!(client.requests.lock().unwrap().is_empty());
    }
}

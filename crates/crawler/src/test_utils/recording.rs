//! Recording worker-side service for tests.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::crawler::{InvocationReasons, Scope};
use crate::error::Result;
use crate::remote::RemoteService;
use crate::snapshot::{Checksum, DocumentId, ProjectId, Solution};

/// One event as the worker saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub scope: Scope,
    pub reasons: InvocationReasons,
    pub checksum: Checksum,
    pub solution_version: u64,
}

/// [`RemoteService`] that stores every event it receives.
#[derive(Default)]
pub struct RecordingService {
    calls: Mutex<Vec<RecordedCall>>,
    notify: Notify,
}

impl RecordingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` calls were recorded
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn record(&self, scope: Scope, reasons: InvocationReasons, solution: &Arc<Solution>) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                scope,
                reasons,
                checksum: solution.checksum(),
                solution_version: solution.version(),
            });
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl RemoteService for RecordingService {
    async fn on_solution_event(
        &self,
        solution: Arc<Solution>,
        reasons: InvocationReasons,
        _token: &CancellationToken,
    ) -> Result<()> {
        self.record(Scope::WholeSolution, reasons, &solution);
        Ok(())
    }

    async fn on_project_event(
        &self,
        solution: Arc<Solution>,
        project: ProjectId,
        reasons: InvocationReasons,
        _token: &CancellationToken,
    ) -> Result<()> {
        self.record(Scope::Project(project), reasons, &solution);
        Ok(())
    }

    async fn on_document_event(
        &self,
        solution: Arc<Solution>,
        document: DocumentId,
        reasons: InvocationReasons,
        _token: &CancellationToken,
    ) -> Result<()> {
        self.record(Scope::Document(document), reasons, &solution);
        Ok(())
    }
}

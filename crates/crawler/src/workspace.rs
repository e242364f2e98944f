//
// workspace.rs
//
// Workspace host: owns the current snapshot, applies mutations and
// notifies subscribed observers
//

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread::{self, ThreadId};

use crate::error::{CrawlerError, Result};
use crate::events::{DocumentEvent, WorkspaceChange, WorkspaceChangeKind};
use crate::snapshot::{
    DocumentId, DocumentKind, DocumentSnapshot, ProjectId, ProjectSnapshot, Solution, WorkspaceId,
};

/// Typed observer for workspace notifications.
///
/// Callbacks run on the mutating thread while mutations are serialized.
/// Mutating the same workspace from a callback fails with
/// [`CrawlerError::ReentrantMutation`]; hand the work to another task instead.
pub trait WorkspaceObserver: Send + Sync {
    fn on_workspace_changed(&self, change: &WorkspaceChange);
    fn on_document_opened(&self, event: &DocumentEvent);
    fn on_document_closed(&self, event: &DocumentEvent);
}

type ObserverList = RwLock<Vec<(u64, Arc<dyn WorkspaceObserver>)>>;

/// Handle tying an observer to a workspace.
///
/// Detaches exactly once, on `unsubscribe()` or on drop.
pub struct Subscription {
    id: u64,
    observers: Weak<ObserverList>,
    detached: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    pub fn is_active(&self) -> bool {
        !self.detached && self.observers.strong_count() > 0
    }

    fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        if let Some(observers) = self.observers.upgrade() {
            let mut guard = observers.write().unwrap_or_else(PoisonError::into_inner);
            guard.retain(|(id, _)| *id != self.id);
            log::trace!("Observer {} unsubscribed ({} remaining)", self.id, guard.len());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

enum DocumentOp {
    Added,
    Removed,
    Changed,
}

fn document_change_kind(kind: DocumentKind, op: DocumentOp) -> WorkspaceChangeKind {
    use WorkspaceChangeKind::*;
    match (kind, op) {
        (DocumentKind::Source, DocumentOp::Added) => DocumentAdded,
        (DocumentKind::Source, DocumentOp::Removed) => DocumentRemoved,
        (DocumentKind::Source, DocumentOp::Changed) => DocumentChanged,
        (DocumentKind::Additional, DocumentOp::Added) => AdditionalDocumentAdded,
        (DocumentKind::Additional, DocumentOp::Removed) => AdditionalDocumentRemoved,
        (DocumentKind::Additional, DocumentOp::Changed) => AdditionalDocumentChanged,
        (DocumentKind::AnalyzerConfig, DocumentOp::Added) => AnalyzerConfigDocumentAdded,
        (DocumentKind::AnalyzerConfig, DocumentOp::Removed) => AnalyzerConfigDocumentRemoved,
        (DocumentKind::AnalyzerConfig, DocumentOp::Changed) => AnalyzerConfigDocumentChanged,
    }
}

/// In-memory workspace producing a new immutable snapshot per mutation
pub struct Workspace {
    id: WorkspaceId,
    current: RwLock<Arc<Solution>>,
    observers: Arc<ObserverList>,
    next_observer: AtomicU64,
    open_documents: RwLock<HashSet<DocumentId>>,
    /// Serializes mutate-and-notify so observers see mutations in order
    mutation: Mutex<()>,
    /// Thread currently running observer callbacks
    notifying: Mutex<Option<ThreadId>>,
}

/// Clears the notifying thread when a broadcast ends, even by panic
struct NotifyingGuard<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for NotifyingGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_id(WorkspaceId::new())
    }

    pub fn with_id(id: WorkspaceId) -> Self {
        Self {
            id,
            current: RwLock::new(Arc::new(Solution::new(id))),
            observers: Arc::new(RwLock::new(Vec::new())),
            next_observer: AtomicU64::new(1),
            open_documents: RwLock::new(HashSet::new()),
            mutation: Mutex::new(()),
            notifying: Mutex::new(None),
        }
    }

    pub fn id(&self) -> WorkspaceId {
        self.id
    }

    pub fn current_solution(&self) -> Arc<Solution> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe(&self, observer: Arc<dyn WorkspaceObserver>) -> Subscription {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        log::trace!("Observer {} subscribed to {}", id, self.id);
        Subscription {
            id,
            observers: Arc::downgrade(&self.observers),
            detached: false,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn observers_snapshot(&self) -> Vec<Arc<dyn WorkspaceObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, o)| o.clone())
            .collect()
    }

    /// Take the mutation lock, refusing re-entry from an observer callback
    fn serialize(&self) -> Result<MutexGuard<'_, ()>> {
        let current = thread::current().id();
        if *self.notifying.lock().unwrap_or_else(PoisonError::into_inner) == Some(current) {
            log::warn!("Observer tried to mutate {} during a notification", self.id);
            return Err(CrawlerError::ReentrantMutation);
        }
        Ok(self.mutation.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn broadcast(&self, notify: impl Fn(&dyn WorkspaceObserver)) {
        *self.notifying.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
        let _clear = NotifyingGuard(&self.notifying);
        for observer in self.observers_snapshot() {
            notify(observer.as_ref());
        }
    }

    /// Apply a mutation and broadcast it.
    ///
    /// The change is validated before the new snapshot is installed, so a
    /// malformed notification never reaches observers.
    pub fn apply(
        &self,
        kind: WorkspaceChangeKind,
        project_id: Option<ProjectId>,
        document_id: Option<DocumentId>,
        mutate: impl FnOnce(&Solution) -> Result<Solution>,
    ) -> Result<Arc<Solution>> {
        let _serial = self.serialize()?;

        let old = self.current_solution();
        let new = Arc::new(mutate(&old)?);
        let change = WorkspaceChange::new(kind, old, new.clone(), project_id, document_id)?;

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = new.clone();
        log::trace!(
            "{:?} applied to {} (version {})",
            kind,
            self.id,
            new.version()
        );

        self.broadcast(|observer| observer.on_workspace_changed(&change));
        Ok(new)
    }

    /// Replace the whole solution (reload from disk, bulk edits)
    pub fn replace_solution(&self, solution: Solution) -> Result<Arc<Solution>> {
        self.apply(WorkspaceChangeKind::SolutionChanged, None, None, |_| {
            Ok(solution)
        })
    }

    pub fn clear_solution(&self) -> Result<Arc<Solution>> {
        let cleared = self.apply(WorkspaceChangeKind::SolutionCleared, None, None, |old| {
            Ok(old.cleared())
        })?;
        self.open_documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(cleared)
    }

    /// Add a new project. Updating an existing one goes through
    /// [`change_project`](Self::change_project).
    pub fn add_project(&self, project: ProjectSnapshot) -> Result<Arc<Solution>> {
        let id = project.id();
        self.apply(WorkspaceChangeKind::ProjectAdded, Some(id), None, |old| {
            if old.contains_project(id) {
                return Err(CrawlerError::ProjectAlreadyExists(id));
            }
            Ok(old.with_project(project))
        })
    }

    pub fn remove_project(&self, id: ProjectId) -> Result<Arc<Solution>> {
        let removed = self.apply(WorkspaceChangeKind::ProjectRemoved, Some(id), None, |old| {
            old.without_project(id)
        })?;
        self.open_documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|d| d.project() != id);
        Ok(removed)
    }

    pub fn change_project(
        &self,
        id: ProjectId,
        update: impl FnOnce(ProjectSnapshot) -> ProjectSnapshot,
    ) -> Result<Arc<Solution>> {
        self.apply(WorkspaceChangeKind::ProjectChanged, Some(id), None, |old| {
            old.update_project(id, update)
        })
    }

    pub fn add_document(&self, document: DocumentSnapshot) -> Result<Arc<Solution>> {
        let id = document.id();
        let kind = document_change_kind(document.kind(), DocumentOp::Added);
        self.apply_document(kind, id, |old| old.with_document(document))
    }

    /// Record an edit to a document (bumps its content version)
    pub fn edit_document(&self, id: DocumentId) -> Result<Arc<Solution>> {
        let kind = self.kind_of(id, DocumentOp::Changed)?;
        self.apply_document(kind, id, |old| old.with_edited_document(id))
    }

    pub fn remove_document(&self, id: DocumentId) -> Result<Arc<Solution>> {
        let kind = self.kind_of(id, DocumentOp::Removed)?;
        let removed = self.apply_document(kind, id, |old| old.without_document(id))?;
        self.open_documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        Ok(removed)
    }

    fn kind_of(&self, id: DocumentId, op: DocumentOp) -> Result<WorkspaceChangeKind> {
        let solution = self.current_solution();
        let document = solution.required_document(id)?;
        Ok(document_change_kind(document.kind(), op))
    }

    fn apply_document(
        &self,
        kind: WorkspaceChangeKind,
        id: DocumentId,
        mutate: impl FnOnce(&Solution) -> Result<Solution>,
    ) -> Result<Arc<Solution>> {
        // Only source documents carry a document id; the other kinds are
        // project-scoped notifications.
        let document_id = kind.requires_document_id().then_some(id);
        self.apply(kind, Some(id.project()), document_id, mutate)
    }

    pub fn open_document(&self, id: DocumentId) -> Result<()> {
        self.notify_document(id, true)
    }

    pub fn close_document(&self, id: DocumentId) -> Result<()> {
        self.notify_document(id, false)
    }

    pub fn is_open(&self, id: DocumentId) -> bool {
        self.open_documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    fn notify_document(&self, id: DocumentId, opened: bool) -> Result<()> {
        let _serial = self.serialize()?;

        let event = DocumentEvent::new(self.current_solution(), id)?;
        {
            let mut open = self
                .open_documents
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let changed = if opened {
                open.insert(id)
            } else {
                open.remove(&id)
            };
            if !changed {
                log::trace!("{} already {}", id, if opened { "open" } else { "closed" });
                return Ok(());
            }
        }

        self.broadcast(|observer| {
            if opened {
                observer.on_document_opened(&event);
            } else {
                observer.on_document_closed(&event);
            }
        });
        Ok(())
    }
}

//
// events.rs
//
// Workspace change notifications as a closed sum type
//

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CrawlerError, Result};
use crate::snapshot::{DocumentId, ProjectId, Solution, WorkspaceId};

/// Kind of mutation reported by a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkspaceChangeKind {
    SolutionChanged,
    SolutionAdded,
    SolutionRemoved,
    SolutionCleared,
    SolutionReloaded,
    ProjectAdded,
    ProjectRemoved,
    ProjectChanged,
    ProjectReloaded,
    DocumentAdded,
    DocumentRemoved,
    DocumentReloaded,
    DocumentChanged,
    AdditionalDocumentAdded,
    AdditionalDocumentRemoved,
    AdditionalDocumentReloaded,
    AdditionalDocumentChanged,
    AnalyzerConfigDocumentAdded,
    AnalyzerConfigDocumentRemoved,
    AnalyzerConfigDocumentReloaded,
    AnalyzerConfigDocumentChanged,
}

impl WorkspaceChangeKind {
    /// Kinds whose event must name the affected project
    pub fn requires_project_id(self) -> bool {
        use WorkspaceChangeKind::*;
        !matches!(
            self,
            SolutionChanged | SolutionAdded | SolutionRemoved | SolutionCleared | SolutionReloaded
        )
    }

    /// Kinds whose event must name the affected source document
    pub fn requires_document_id(self) -> bool {
        use WorkspaceChangeKind::*;
        matches!(
            self,
            DocumentAdded | DocumentRemoved | DocumentReloaded | DocumentChanged
        )
    }
}

/// A generic workspace mutation: old and new snapshot of the same workspace
#[derive(Debug, Clone)]
pub struct WorkspaceChange {
    kind: WorkspaceChangeKind,
    old: Arc<Solution>,
    new: Arc<Solution>,
    project_id: Option<ProjectId>,
    document_id: Option<DocumentId>,
}

impl WorkspaceChange {
    /// Validate and build a change notification.
    ///
    /// The project id is inferred from the document id when only the latter
    /// is given.
    pub fn new(
        kind: WorkspaceChangeKind,
        old: Arc<Solution>,
        new: Arc<Solution>,
        project_id: Option<ProjectId>,
        document_id: Option<DocumentId>,
    ) -> Result<Self> {
        if old.workspace() != new.workspace() {
            return Err(CrawlerError::WorkspaceMismatch {
                old: old.workspace(),
                new: new.workspace(),
            });
        }

        let project_id = project_id.or(document_id.map(DocumentId::project));
        if kind.requires_project_id() && project_id.is_none() {
            return Err(CrawlerError::MissingProjectId { kind });
        }
        if kind.requires_document_id() && document_id.is_none() {
            return Err(CrawlerError::MissingDocumentId { kind });
        }

        Ok(Self {
            kind,
            old,
            new,
            project_id,
            document_id,
        })
    }

    pub fn kind(&self) -> WorkspaceChangeKind {
        self.kind
    }

    pub fn old_solution(&self) -> &Arc<Solution> {
        &self.old
    }

    pub fn new_solution(&self) -> &Arc<Solution> {
        &self.new
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.document_id
    }

    /// Project id for kinds validated to carry one
    pub(crate) fn required_project_id(&self) -> Result<ProjectId> {
        self.project_id
            .ok_or(CrawlerError::MissingProjectId { kind: self.kind })
    }

    pub(crate) fn required_document_id(&self) -> Result<DocumentId> {
        self.document_id
            .ok_or(CrawlerError::MissingDocumentId { kind: self.kind })
    }
}

/// A document opened or closed in a given snapshot
#[derive(Debug, Clone)]
pub struct DocumentEvent {
    solution: Arc<Solution>,
    document: DocumentId,
}

impl DocumentEvent {
    pub fn new(solution: Arc<Solution>, document: DocumentId) -> Result<Self> {
        solution.required_document(document)?;
        Ok(Self { solution, document })
    }

    pub fn solution(&self) -> &Arc<Solution> {
        &self.solution
    }

    pub fn document_id(&self) -> DocumentId {
        self.document
    }
}

/// Uniform event consumed by the crawler queue
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    WorkspaceChanged(WorkspaceChange),
    DocumentOpened(DocumentEvent),
    DocumentClosed(DocumentEvent),
}

impl ChangeEvent {
    /// The snapshot the event was raised against (the old one for changes)
    pub fn solution(&self) -> &Arc<Solution> {
        match self {
            ChangeEvent::WorkspaceChanged(change) => change.old_solution(),
            ChangeEvent::DocumentOpened(event) | ChangeEvent::DocumentClosed(event) => {
                event.solution()
            }
        }
    }

    pub fn workspace(&self) -> WorkspaceId {
        self.solution().workspace()
    }
}

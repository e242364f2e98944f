//
// error.rs
//
// Error taxonomy for the crawler and the reference search engine
//

use thiserror::Error;

use crate::events::WorkspaceChangeKind;
use crate::snapshot::{Checksum, DocumentId, ProjectId, WorkspaceId};

#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("snapshots belong to different workspaces ({old} vs {new})")]
    WorkspaceMismatch { old: WorkspaceId, new: WorkspaceId },

    #[error("{kind:?} event requires a project id")]
    MissingProjectId { kind: WorkspaceChangeKind },

    #[error("{kind:?} event requires a document id")]
    MissingDocumentId { kind: WorkspaceChangeKind },

    #[error("project {0} not found in solution")]
    ProjectNotFound(ProjectId),

    #[error("document {0} not found in solution")]
    DocumentNotFound(DocumentId),

    #[error("project {0} already exists in solution")]
    ProjectAlreadyExists(ProjectId),

    #[error("workspace mutated from inside an observer callback")]
    ReentrantMutation,

    #[error("snapshot {0} is not known to the remote side")]
    SnapshotNotFound(Checksum),

    #[error("remote worker disconnected")]
    WorkerDisconnected,

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl CrawlerError {
    /// Cancellation is an outcome, not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CrawlerError::Cancelled)
    }
}

/// Check whether an `anyhow` error wraps a crawler cancellation.
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CrawlerError>()
        .map(CrawlerError::is_cancelled)
        .unwrap_or(false)
}

pub type Result<T> = std::result::Result<T, CrawlerError>;

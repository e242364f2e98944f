//
// snapshot/solution.rs
//
// Immutable, versioned solution snapshots with content checksums
//

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::ids::{DocumentId, ProjectId, WorkspaceId};
use super::project::{DocumentSnapshot, ProjectSnapshot, VersionStamp};
use crate::error::{CrawlerError, Result};

/// Content address of a solution snapshot.
///
/// Equal content yields an equal checksum regardless of the snapshot version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(u64);

impl Checksum {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A workspace state at a point in time.
///
/// Projects are shared between snapshots through `Arc`, so deriving a new
/// snapshot only copies the project that changed.
#[derive(Debug)]
pub struct Solution {
    workspace: WorkspaceId,
    version: u64,
    projects: IndexMap<ProjectId, Arc<ProjectSnapshot>>,
    checksum: OnceLock<Checksum>,
}

impl Solution {
    /// Create the empty initial snapshot of a workspace
    pub fn new(workspace: WorkspaceId) -> Self {
        Self {
            workspace,
            version: 0,
            projects: IndexMap::new(),
            checksum: OnceLock::new(),
        }
    }

    fn derive(&self, projects: IndexMap<ProjectId, Arc<ProjectSnapshot>>) -> Self {
        Self {
            workspace: self.workspace,
            version: self.version + 1,
            projects,
            checksum: OnceLock::new(),
        }
    }

    pub fn workspace(&self) -> WorkspaceId {
        self.workspace
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn projects(&self) -> impl Iterator<Item = &Arc<ProjectSnapshot>> {
        self.projects.values()
    }

    pub fn project_ids(&self) -> impl Iterator<Item = ProjectId> + '_ {
        self.projects.keys().copied()
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    pub fn project(&self, id: ProjectId) -> Option<&Arc<ProjectSnapshot>> {
        self.projects.get(&id)
    }

    pub fn contains_project(&self, id: ProjectId) -> bool {
        self.projects.contains_key(&id)
    }

    pub fn required_project(&self, id: ProjectId) -> Result<&Arc<ProjectSnapshot>> {
        self.project(id).ok_or(CrawlerError::ProjectNotFound(id))
    }

    pub fn document(&self, id: DocumentId) -> Option<&DocumentSnapshot> {
        self.project(id.project())?.document(id)
    }

    pub fn contains_document(&self, id: DocumentId) -> bool {
        self.document(id).is_some()
    }

    pub fn required_document(&self, id: DocumentId) -> Result<&DocumentSnapshot> {
        self.document(id).ok_or(CrawlerError::DocumentNotFound(id))
    }

    /// Content checksum, computed once per snapshot
    pub fn checksum(&self) -> Checksum {
        *self.checksum.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            self.workspace.hash(&mut hasher);
            for project in self.projects.values() {
                project.id().hash(&mut hasher);
                project.config().hash(&mut hasher);
                project.references().hash(&mut hasher);
                project.run_analyzers().hash(&mut hasher);
                for document in project.all_documents() {
                    document.hash(&mut hasher);
                }
            }
            Checksum(hasher.finish())
        })
    }

    /// Add a project, or replace it in place if it already exists
    pub fn with_project(&self, project: ProjectSnapshot) -> Self {
        let mut projects = self.projects.clone();
        projects.insert(project.id(), Arc::new(project));
        self.derive(projects)
    }

    pub fn without_project(&self, id: ProjectId) -> Result<Self> {
        let mut projects = self.projects.clone();
        projects
            .shift_remove(&id)
            .ok_or(CrawlerError::ProjectNotFound(id))?;
        Ok(self.derive(projects))
    }

    /// Derive a snapshot with one project rewritten by `update`
    pub fn update_project(
        &self,
        id: ProjectId,
        update: impl FnOnce(ProjectSnapshot) -> ProjectSnapshot,
    ) -> Result<Self> {
        let current = self.required_project(id)?;
        let updated = update(ProjectSnapshot::clone(current));
        let mut projects = self.projects.clone();
        projects.insert(id, Arc::new(updated));
        Ok(self.derive(projects))
    }

    /// Derive an empty snapshot of the same workspace
    pub fn cleared(&self) -> Self {
        self.derive(IndexMap::new())
    }

    pub fn with_document(&self, document: DocumentSnapshot) -> Result<Self> {
        self.update_project(document.project_id(), |p| p.with_document(document))
    }

    pub fn without_document(&self, id: DocumentId) -> Result<Self> {
        self.required_document(id)?;
        self.update_project(id.project(), |p| p.without_document(id))
    }

    pub fn with_document_version(&self, id: DocumentId, version: VersionStamp) -> Result<Self> {
        let document = self.required_document(id)?.with_version(version);
        self.with_document(document)
    }

    /// Bump a document's content version
    pub fn with_edited_document(&self, id: DocumentId) -> Result<Self> {
        let next = self.required_document(id)?.version().next();
        self.with_document_version(id, next)
    }
}

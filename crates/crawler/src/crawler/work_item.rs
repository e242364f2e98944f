//
// crawler/work_item.rs
//
// The unit of work produced by the differ and consumed by the dispatcher
//

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::reasons::InvocationReasons;
use crate::snapshot::{DocumentId, ProjectId, Solution};

/// What a reason set applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    WholeSolution,
    Project(ProjectId),
    Document(DocumentId),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::WholeSolution => write!(f, "solution"),
            Scope::Project(id) => write!(f, "{}", id),
            Scope::Document(id) => write!(f, "{}", id),
        }
    }
}

/// A (scope, reasons) pair bound to the snapshot it must be analyzed against.
///
/// Removals are bound to the old snapshot, since the removed entity no
/// longer exists in the new one.
#[derive(Clone)]
pub struct WorkItem {
    scope: Scope,
    reasons: InvocationReasons,
    solution: Arc<Solution>,
}

impl WorkItem {
    pub fn new(scope: Scope, reasons: InvocationReasons, solution: Arc<Solution>) -> Self {
        Self {
            scope,
            reasons,
            solution,
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn reasons(&self) -> InvocationReasons {
        self.reasons
    }

    pub fn solution(&self) -> &Arc<Solution> {
        &self.solution
    }
}

// Snapshots compare by content
impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.scope == other.scope
            && self.reasons == other.reasons
            && self.solution.checksum() == other.solution.checksum()
    }
}

impl Eq for WorkItem {}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("scope", &self.scope)
            .field("reasons", &format_args!("{}", self.reasons))
            .field("solution_version", &self.solution.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ProjectSnapshot, WorkspaceId};

    #[test]
    fn test_equality_ignores_snapshot_version() {
        let ws = WorkspaceId::from_raw(1);
        let pid = ProjectId::from_raw(1);
        let a = Arc::new(Solution::new(ws).with_project(ProjectSnapshot::new(pid, "p")));
        let b = Arc::new(a.update_project(pid, |p| p).unwrap());

        let scope = Scope::Project(pid);
        let reasons = InvocationReasons::DOCUMENT_ADDED;
        assert_eq!(
            WorkItem::new(scope, reasons, a.clone()),
            WorkItem::new(scope, reasons, b)
        );
        assert_ne!(
            WorkItem::new(scope, reasons, a.clone()),
            WorkItem::new(scope, InvocationReasons::DOCUMENT_REMOVED, a)
        );
    }

    #[test]
    fn test_debug_is_compact() {
        let item = WorkItem::new(
            Scope::WholeSolution,
            InvocationReasons::SOLUTION_REMOVED,
            Arc::new(Solution::new(WorkspaceId::from_raw(1))),
        );
        let debug = format!("{:?}", item);
        assert!(debug.contains("SolutionRemoved"));
        assert!(debug.contains("solution_version: 0"));
    }
}

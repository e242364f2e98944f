//
// crawler/differ.rs
//
// Translate change events and snapshot pairs into ordered work items
//

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use super::reasons::InvocationReasons;
use super::work_item::{Scope, WorkItem};
use crate::error::{CrawlerError, Result};
use crate::events::{ChangeEvent, DocumentEvent, WorkspaceChange, WorkspaceChangeKind};
use crate::perf::TimingGuard;
use crate::snapshot::{DocumentId, DocumentKind, ProjectId, ProjectSnapshot, Solution};

/// Work items for one change event, in emission order
pub fn diff_event(event: &ChangeEvent) -> Result<Vec<WorkItem>> {
    match event {
        ChangeEvent::WorkspaceChanged(change) => diff_workspace_change(change),
        ChangeEvent::DocumentOpened(event) => {
            Ok(vec![document_item(event, InvocationReasons::DOCUMENT_OPENED)])
        }
        ChangeEvent::DocumentClosed(event) => {
            Ok(vec![document_item(event, InvocationReasons::DOCUMENT_CLOSED)])
        }
    }
}

fn document_item(event: &DocumentEvent, reasons: InvocationReasons) -> WorkItem {
    WorkItem::new(
        Scope::Document(event.document_id()),
        reasons,
        event.solution().clone(),
    )
}

pub fn diff_workspace_change(change: &WorkspaceChange) -> Result<Vec<WorkItem>> {
    use WorkspaceChangeKind::*;

    let old = change.old_solution();
    let new = change.new_solution();

    let items = match change.kind() {
        SolutionAdded => vec![WorkItem::new(
            Scope::WholeSolution,
            InvocationReasons::DOCUMENT_ADDED,
            new.clone(),
        )],
        SolutionRemoved | SolutionCleared => vec![WorkItem::new(
            Scope::WholeSolution,
            InvocationReasons::SOLUTION_REMOVED,
            old.clone(),
        )],
        SolutionChanged | SolutionReloaded => diff_solutions(old, new)?,

        ProjectAdded => vec![WorkItem::new(
            Scope::Project(change.required_project_id()?),
            InvocationReasons::DOCUMENT_ADDED,
            new.clone(),
        )],
        ProjectRemoved => vec![WorkItem::new(
            Scope::Project(change.required_project_id()?),
            InvocationReasons::DOCUMENT_REMOVED,
            old.clone(),
        )],
        ProjectChanged | ProjectReloaded => {
            let id = change.required_project_id()?;
            diff_project(old, new, old.required_project(id)?, new.required_project(id)?)
        }

        DocumentAdded => vec![WorkItem::new(
            Scope::Document(change.required_document_id()?),
            InvocationReasons::DOCUMENT_ADDED,
            new.clone(),
        )],
        DocumentRemoved => vec![WorkItem::new(
            Scope::Document(change.required_document_id()?),
            InvocationReasons::DOCUMENT_REMOVED,
            old.clone(),
        )],
        DocumentChanged | DocumentReloaded => {
            let id = change.required_document_id()?;
            let before = old.required_document(id)?;
            let after = new.required_document(id)?;
            if before.version() == after.version() {
                log::trace!("{} reported changed with no version bump, skipping", id);
                Vec::new()
            } else {
                vec![WorkItem::new(
                    Scope::Document(id),
                    InvocationReasons::DOCUMENT_CHANGED,
                    new.clone(),
                )]
            }
        }

        // Non-source files can affect every document of the project
        AdditionalDocumentAdded
        | AdditionalDocumentRemoved
        | AdditionalDocumentChanged
        | AdditionalDocumentReloaded
        | AnalyzerConfigDocumentAdded
        | AnalyzerConfigDocumentRemoved
        | AnalyzerConfigDocumentChanged
        | AnalyzerConfigDocumentReloaded => vec![WorkItem::new(
            Scope::Project(change.required_project_id()?),
            InvocationReasons::ADDITIONAL_DOCUMENT_CHANGED,
            new.clone(),
        )],
    };

    for item in &items {
        log::trace!("{:?} -> {} [{}]", change.kind(), item.scope(), item.reasons());
    }
    Ok(items)
}

/// Structural diff of two snapshots of the same workspace.
///
/// Emits added projects, then per-project changes, then removed projects.
/// Diffing a snapshot against itself yields nothing.
pub fn diff_solutions(old: &Arc<Solution>, new: &Arc<Solution>) -> Result<Vec<WorkItem>> {
    if old.workspace() != new.workspace() {
        return Err(CrawlerError::WorkspaceMismatch {
            old: old.workspace(),
            new: new.workspace(),
        });
    }
    if Arc::ptr_eq(old, new) {
        return Ok(Vec::new());
    }

    let _timer = TimingGuard::with_threshold("solution_diff", 50);
    let mut items = Vec::new();

    for project in new.projects() {
        if !old.contains_project(project.id()) {
            items.push(WorkItem::new(
                Scope::Project(project.id()),
                InvocationReasons::DOCUMENT_ADDED,
                new.clone(),
            ));
        }
    }

    for new_project in new.projects() {
        if let Some(old_project) = old.project(new_project.id()) {
            items.extend(diff_project(old, new, old_project, new_project));
        }
    }

    for project in old.projects() {
        if !new.contains_project(project.id()) {
            items.push(WorkItem::new(
                Scope::Project(project.id()),
                InvocationReasons::DOCUMENT_REMOVED,
                old.clone(),
            ));
        }
    }

    log::trace!(
        "Diffed solution v{} -> v{}: {} work items",
        old.version(),
        new.version(),
        items.len()
    );
    Ok(items)
}

/// Project-level diff: the configuration item (if any), then added, changed
/// and removed source documents.
pub fn diff_project(
    old_solution: &Arc<Solution>,
    new_solution: &Arc<Solution>,
    old: &Arc<ProjectSnapshot>,
    new: &Arc<ProjectSnapshot>,
) -> Vec<WorkItem> {
    if Arc::ptr_eq(old, new) {
        return Vec::new();
    }

    let mut items = Vec::new();
    let project_id: ProjectId = new.id();

    let reasons = project_reasons(old, new);
    if !reasons.is_empty() {
        items.push(WorkItem::new(
            Scope::Project(project_id),
            reasons,
            new_solution.clone(),
        ));
    }

    let added: Vec<DocumentId> = new
        .documents()
        .filter(|d| !old.contains_document(d.id()))
        .map(|d| d.id())
        .collect();
    let changed: Vec<DocumentId> = new
        .documents()
        .filter(|d| {
            old.document(d.id())
                .map(|before| before.version() != d.version())
                .unwrap_or(false)
        })
        .map(|d| d.id())
        .collect();
    let removed: Vec<DocumentId> = old
        .documents()
        .filter(|d| !new.contains_document(d.id()))
        .map(|d| d.id())
        .collect();

    items.extend(added.into_iter().map(|id| {
        WorkItem::new(
            Scope::Document(id),
            InvocationReasons::DOCUMENT_ADDED,
            new_solution.clone(),
        )
    }));
    items.extend(changed.into_iter().map(|id| {
        WorkItem::new(
            Scope::Document(id),
            InvocationReasons::DOCUMENT_CHANGED,
            new_solution.clone(),
        )
    }));
    items.extend(removed.into_iter().map(|id| {
        WorkItem::new(
            Scope::Document(id),
            InvocationReasons::DOCUMENT_REMOVED,
            old_solution.clone(),
        )
    }));

    items
}

/// Reasons contributed by the project's own state (configuration,
/// references, analysis flag, non-source documents).
pub fn project_reasons(old: &ProjectSnapshot, new: &ProjectSnapshot) -> InvocationReasons {
    let mut reasons = InvocationReasons::EMPTY;

    let (old_config, new_config) = (old.config(), new.config());
    if old_config.parse_options != new_config.parse_options {
        reasons |= InvocationReasons::PROJECT_PARSE_OPTION_CHANGED;
    }

    let (old_refs, new_refs) = (old.references(), new.references());
    if old_config != new_config
        || differs_as_set(&old_refs.metadata, &new_refs.metadata)
        || differs_as_set(&old_refs.projects, &new_refs.projects)
        || differs_as_set(&old_refs.analyzers, &new_refs.analyzers)
        || old.run_analyzers() != new.run_analyzers()
    {
        reasons |= InvocationReasons::PROJECT_CONFIGURATION_CHANGED;
    }

    if non_source_documents_changed(old, new) {
        reasons |= InvocationReasons::ADDITIONAL_DOCUMENT_CHANGED;
    }

    reasons
}

/// Whether either list has an element the other lacks
fn differs_as_set<T: Eq + Hash>(old: &[T], new: &[T]) -> bool {
    let old: HashSet<&T> = old.iter().collect();
    let new: HashSet<&T> = new.iter().collect();
    old != new
}

fn non_source_documents_changed(old: &ProjectSnapshot, new: &ProjectSnapshot) -> bool {
    let non_source = |p: &ProjectSnapshot| -> HashSet<_> {
        p.all_documents()
            .filter(|d| d.kind() != DocumentKind::Source)
            .map(|d| (d.id(), d.kind(), d.version()))
            .collect()
    };
    non_source(old) != non_source(new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{
        DocumentSnapshot, OptionSet, ProjectReferences, VersionStamp, WorkspaceId,
    };

    fn base() -> (Arc<Solution>, ProjectId, DocumentId) {
        let pid = ProjectId::from_raw(1);
        let did = DocumentId::from_raw(pid, 1);
        let solution = Solution::new(WorkspaceId::from_raw(1)).with_project(
            ProjectSnapshot::new(pid, "A")
                .with_document(DocumentSnapshot::source(did, "a.cs"))
                .with_document(DocumentSnapshot::new(
                    DocumentId::from_raw(pid, 2),
                    ".editorconfig",
                    DocumentKind::AnalyzerConfig,
                )),
        );
        (Arc::new(solution), pid, did)
    }

    fn change(
        kind: WorkspaceChangeKind,
        old: &Arc<Solution>,
        new: &Arc<Solution>,
        project: Option<ProjectId>,
        document: Option<DocumentId>,
    ) -> WorkspaceChange {
        WorkspaceChange::new(kind, old.clone(), new.clone(), project, document).unwrap()
    }

    #[test]
    fn test_identical_solutions_yield_nothing() {
        let (solution, _, _) = base();
        assert!(diff_solutions(&solution, &solution).unwrap().is_empty());

        let copy = Arc::new(solution.update_project(ProjectId::from_raw(1), |p| p).unwrap());
        assert!(diff_solutions(&solution, &copy).unwrap().is_empty());
    }

    #[test]
    fn test_added_project_yields_one_item() {
        let (old, _, _) = base();
        let b = ProjectId::from_raw(2);
        let new = Arc::new(old.with_project(ProjectSnapshot::new(b, "B")));

        let items = diff_solutions(&old, &new).unwrap();
        assert_eq!(
            items,
            vec![WorkItem::new(
                Scope::Project(b),
                InvocationReasons::DOCUMENT_ADDED,
                new.clone()
            )]
        );
    }

    #[test]
    fn test_parse_option_change_contributes_both_reasons() {
        let (old, pid, _) = base();
        let new = Arc::new(
            old.update_project(pid, |p| {
                let mut config = p.config().clone();
                config.parse_options = OptionSet::new().with("langversion", "12");
                p.with_config(config)
            })
            .unwrap(),
        );

        let items = diff_solutions(&old, &new).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].scope(), Scope::Project(pid));
        assert_eq!(
            items[0].reasons(),
            InvocationReasons::PROJECT_CONFIGURATION_CHANGED
                | InvocationReasons::PROJECT_PARSE_OPTION_CHANGED
        );
    }

    #[test]
    fn test_reference_reordering_is_not_a_change() {
        let (old, pid, _) = base();
        let with_refs = |refs: Vec<&str>| {
            let refs = ProjectReferences {
                metadata: refs.into_iter().map(String::from).collect(),
                ..ProjectReferences::default()
            };
            Arc::new(old.update_project(pid, |p| p.with_references(refs)).unwrap())
        };
        let a = with_refs(vec!["core.dll", "io.dll"]);
        let b = with_refs(vec!["io.dll", "core.dll"]);
        assert!(diff_solutions(&a, &b).unwrap().is_empty());

        let c = with_refs(vec!["core.dll"]);
        let items = diff_solutions(&a, &c).unwrap();
        assert_eq!(
            items[0].reasons(),
            InvocationReasons::PROJECT_CONFIGURATION_CHANGED
        );
    }

    #[test]
    fn test_run_analyzers_flag_is_tracked() {
        let (old, pid, _) = base();
        let new = Arc::new(
            old.update_project(pid, |p| p.with_run_analyzers(false))
                .unwrap(),
        );
        let items = diff_solutions(&old, &new).unwrap();
        assert_eq!(
            items[0].reasons(),
            InvocationReasons::PROJECT_CONFIGURATION_CHANGED
        );
    }

    #[test]
    fn test_analyzer_config_change_is_project_scoped() {
        let (old, pid, _) = base();
        let config_doc = DocumentId::from_raw(pid, 2);
        let new = Arc::new(old.with_edited_document(config_doc).unwrap());

        let event = change(
            WorkspaceChangeKind::AnalyzerConfigDocumentChanged,
            &old,
            &new,
            Some(pid),
            None,
        );
        let items = diff_workspace_change(&event).unwrap();
        assert_eq!(
            items,
            vec![WorkItem::new(
                Scope::Project(pid),
                InvocationReasons::ADDITIONAL_DOCUMENT_CHANGED,
                new.clone()
            )]
        );

        // The structural path reaches the same conclusion
        let items = diff_solutions(&old, &new).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].scope(), Scope::Project(pid));
        assert_eq!(
            items[0].reasons(),
            InvocationReasons::ADDITIONAL_DOCUMENT_CHANGED
        );
    }

    #[test]
    fn test_project_diff_orders_documents() {
        let (old, pid, did) = base();
        let added = DocumentId::from_raw(pid, 3);
        let removed_later = DocumentId::from_raw(pid, 4);
        let old = Arc::new(
            old.with_document(DocumentSnapshot::source(removed_later, "gone.cs"))
                .unwrap(),
        );
        let new = Arc::new(
            old.with_document(DocumentSnapshot::source(added, "new.cs"))
                .and_then(|s| s.with_edited_document(did))
                .and_then(|s| s.without_document(removed_later))
                .unwrap(),
        );

        let event = change(WorkspaceChangeKind::ProjectChanged, &old, &new, Some(pid), None);
        let items = diff_workspace_change(&event).unwrap();
        let summary: Vec<_> = items.iter().map(|i| (i.scope(), i.reasons())).collect();
        assert_eq!(
            summary,
            vec![
                (Scope::Document(added), InvocationReasons::DOCUMENT_ADDED),
                (Scope::Document(did), InvocationReasons::DOCUMENT_CHANGED),
                (Scope::Document(removed_later), InvocationReasons::DOCUMENT_REMOVED),
            ]
        );
        // Removals are bound to the snapshot that still has the document
        assert!(items[2].solution().contains_document(removed_later));
    }

    #[test]
    fn test_solution_change_orders_projects() {
        let (old, a, _) = base();
        let gone = ProjectId::from_raw(9);
        let old = Arc::new(old.with_project(ProjectSnapshot::new(gone, "Gone")));
        let fresh = ProjectId::from_raw(5);
        let new = Arc::new(
            old.with_project(ProjectSnapshot::new(fresh, "Fresh"))
                .update_project(a, |p| p.with_run_analyzers(false))
                .and_then(|s| s.without_project(gone))
                .unwrap(),
        );

        let event = change(WorkspaceChangeKind::SolutionChanged, &old, &new, None, None);
        let scopes: Vec<_> = diff_event(&ChangeEvent::WorkspaceChanged(event))
            .unwrap()
            .iter()
            .map(|i| i.scope())
            .collect();
        assert_eq!(
            scopes,
            vec![Scope::Project(fresh), Scope::Project(a), Scope::Project(gone)]
        );
    }

    #[test]
    fn test_document_change_without_version_bump_is_dropped() {
        let (old, _, did) = base();
        let same = Arc::new(
            old.with_document_version(did, VersionStamp::initial())
                .unwrap(),
        );
        let event = change(WorkspaceChangeKind::DocumentChanged, &old, &same, None, Some(did));
        assert!(diff_workspace_change(&event).unwrap().is_empty());

        let edited = Arc::new(old.with_edited_document(did).unwrap());
        let event = change(WorkspaceChangeKind::DocumentChanged, &old, &edited, None, Some(did));
        let items = diff_workspace_change(&event).unwrap();
        assert_eq!(items[0].reasons(), InvocationReasons::DOCUMENT_CHANGED);
    }

    #[test]
    fn test_solution_level_kinds() {
        let (old, _, _) = base();
        let cleared = Arc::new(old.cleared());

        let event = change(WorkspaceChangeKind::SolutionCleared, &old, &cleared, None, None);
        let items = diff_workspace_change(&event).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].scope(), Scope::WholeSolution);
        assert_eq!(items[0].reasons(), InvocationReasons::SOLUTION_REMOVED);
        assert!(Arc::ptr_eq(items[0].solution(), &old));

        let event = change(WorkspaceChangeKind::SolutionAdded, &cleared, &old, None, None);
        let items = diff_workspace_change(&event).unwrap();
        assert_eq!(items[0].reasons(), InvocationReasons::DOCUMENT_ADDED);
        assert!(Arc::ptr_eq(items[0].solution(), &old));
    }

    #[test]
    fn test_opened_and_closed_use_their_own_document() {
        let (solution, _, did) = base();
        let opened = ChangeEvent::DocumentOpened(DocumentEvent::new(solution.clone(), did).unwrap());
        let closed = ChangeEvent::DocumentClosed(DocumentEvent::new(solution.clone(), did).unwrap());

        let items = diff_event(&opened).unwrap();
        assert_eq!(items[0].scope(), Scope::Document(did));
        assert_eq!(items[0].reasons(), InvocationReasons::DOCUMENT_OPENED);

        let items = diff_event(&closed).unwrap();
        assert_eq!(items[0].scope(), Scope::Document(did));
        assert_eq!(items[0].reasons(), InvocationReasons::DOCUMENT_CLOSED);
    }

    #[test]
    fn test_project_changed_for_missing_project_is_an_error() {
        let (old, _, _) = base();
        let ghost = ProjectId::from_raw(77);
        let event = change(WorkspaceChangeKind::ProjectChanged, &old, &old, Some(ghost), None);
        assert!(matches!(
            diff_workspace_change(&event),
            Err(CrawlerError::ProjectNotFound(id)) if id == ghost
        ));
    }

    #[test]
    fn test_cross_workspace_diff_rejected() {
        let (old, _, _) = base();
        let other = Arc::new(Solution::new(WorkspaceId::from_raw(2)));
        assert!(matches!(
            diff_solutions(&old, &other),
            Err(CrawlerError::WorkspaceMismatch { .. })
        ));
    }
}

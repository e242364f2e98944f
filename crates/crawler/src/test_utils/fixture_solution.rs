//! Deterministic fixture solution generator for benchmarks and tests.
//!
//! Generates synthetic solutions with controlled characteristics: project
//! count, documents per project, additional documents and a project
//! reference chain. A matching symbol graph gives every source document a
//! declared method that the next document references.
//!
//! Ids are derived from indices, so two calls with the same config produce
//! solutions with the same checksum.

use std::sync::Arc;

use crate::error::Result;
use crate::find_symbols::{SymbolGraph, SymbolInfo, SymbolKind, TextSpan};
use crate::snapshot::{
    DocumentId, DocumentKind, DocumentSnapshot, ProjectId, ProjectReferences, ProjectSnapshot,
    Solution, SymbolId, WorkspaceId,
};

/// Workspace id shared by every generated solution
pub const FIXTURE_WORKSPACE: WorkspaceId = WorkspaceId::from_raw(1);

/// Configuration for generating a fixture solution.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub project_count: usize,
    pub documents_per_project: usize,
    pub additional_documents_per_project: usize,
    /// Project i references project i+1 for the first `reference_chain_depth` projects
    pub reference_chain_depth: usize,
}

impl FixtureConfig {
    /// Small solution: 3 projects, 10 documents each.
    pub fn small() -> Self {
        Self {
            project_count: 3,
            documents_per_project: 10,
            additional_documents_per_project: 1,
            reference_chain_depth: 2,
        }
    }

    /// Medium solution: 20 projects, 50 documents each.
    pub fn medium() -> Self {
        Self {
            project_count: 20,
            documents_per_project: 50,
            additional_documents_per_project: 2,
            reference_chain_depth: 10,
        }
    }

    /// Large solution: 100 projects, 200 documents each.
    pub fn large() -> Self {
        Self {
            project_count: 100,
            documents_per_project: 200,
            additional_documents_per_project: 4,
            reference_chain_depth: 30,
        }
    }
}

pub fn fixture_project_id(project: usize) -> ProjectId {
    ProjectId::from_raw(project as u64 + 1)
}

/// Id of the `index`-th source document of a project
pub fn fixture_document_id(project: usize, index: usize) -> DocumentId {
    DocumentId::from_raw(fixture_project_id(project), index as u64 + 1)
}

/// Id of the method declared in a source document
pub fn fixture_symbol_id(project: usize, index: usize) -> SymbolId {
    SymbolId::from_raw(((project as u64 + 1) << 32) | (index as u64 + 1))
}

fn generate_project(index: usize, config: &FixtureConfig) -> ProjectSnapshot {
    let pid = fixture_project_id(index);
    let mut project = ProjectSnapshot::new(pid, format!("Project{}", index));

    if index < config.reference_chain_depth && index + 1 < config.project_count {
        project = project.with_references(ProjectReferences {
            metadata: vec!["System.Runtime".to_string()],
            projects: vec![fixture_project_id(index + 1)],
            analyzers: Vec::new(),
        });
    }

    for d in 0..config.documents_per_project {
        project = project.with_document(DocumentSnapshot::source(
            fixture_document_id(index, d),
            format!("File{}.cs", d),
        ));
    }

    let first_additional = config.documents_per_project;
    for a in 0..config.additional_documents_per_project {
        project = project.with_document(DocumentSnapshot::new(
            fixture_document_id(index, first_additional + a),
            format!("notes{}.txt", a),
            DocumentKind::Additional,
        ));
    }
    project
}

/// Generate a solution from the given configuration.
pub fn generate_solution(config: &FixtureConfig) -> Solution {
    (0..config.project_count).fold(Solution::new(FIXTURE_WORKSPACE), |solution, i| {
        solution.with_project(generate_project(i, config))
    })
}

/// Bump the version of every `stride`-th source document.
///
/// Returns `None` when the config has no source documents to edit.
pub fn edit_every_nth(
    solution: &Solution,
    config: &FixtureConfig,
    stride: usize,
) -> Result<Option<Solution>> {
    let stride = stride.max(1);
    let mut edited: Option<Solution> = None;
    for p in 0..config.project_count {
        for d in (0..config.documents_per_project).step_by(stride) {
            let base = edited.as_ref().unwrap_or(solution);
            edited = Some(base.with_edited_document(fixture_document_id(p, d))?);
        }
    }
    Ok(edited)
}

/// Build a symbol graph over a generated solution.
///
/// Document d of each project declares `Method{d}` at `0..8`; document d+1
/// references it at `40..48`. Every method overrides the one declared by the
/// previous document, forming one override chain per project.
pub fn generate_symbol_graph(config: &FixtureConfig) -> Arc<SymbolGraph> {
    let graph = SymbolGraph::shared();
    for p in 0..config.project_count {
        for d in 0..config.documents_per_project {
            let id = fixture_symbol_id(p, d);
            let declaration = fixture_document_id(p, d);
            graph.add_symbol(SymbolInfo {
                id,
                name: format!("Method{}", d),
                kind: SymbolKind::Method,
                declaration,
                span: TextSpan::new(0, 8),
            });
            if d + 1 < config.documents_per_project {
                graph.add_reference(id, fixture_document_id(p, d + 1), TextSpan::new(40, 48));
            }
            if d > 0 {
                graph.add_override(id, fixture_symbol_id(p, d - 1));
            }
        }
    }
    graph
}

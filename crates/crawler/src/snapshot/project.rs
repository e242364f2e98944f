//
// snapshot/project.rs
//
// Immutable project and document snapshots
//

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;

use super::ids::{DocumentId, ProjectId};

/// Monotonic content version of a document.
///
/// Diffing compares versions only, never text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VersionStamp(u64);

impl VersionStamp {
    pub const fn initial() -> Self {
        Self(0)
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Which document collection of a project a document lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// Compiled source file
    Source,
    /// Non-source file consumed by analyzers
    Additional,
    /// Analyzer configuration file (editorconfig-like)
    AnalyzerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentSnapshot {
    id: DocumentId,
    name: Arc<str>,
    kind: DocumentKind,
    version: VersionStamp,
}

impl DocumentSnapshot {
    pub fn new(id: DocumentId, name: impl Into<Arc<str>>, kind: DocumentKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            version: VersionStamp::initial(),
        }
    }

    pub fn source(id: DocumentId, name: impl Into<Arc<str>>) -> Self {
        Self::new(id, name, DocumentKind::Source)
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn project_id(&self) -> ProjectId {
        self.id.project()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn version(&self) -> VersionStamp {
        self.version
    }

    pub fn with_version(&self, version: VersionStamp) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }
}

/// Ordered key/value option bag (parse, compilation or analyzer options)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct OptionSet(BTreeMap<String, String>);

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CompilationOutputInfo {
    pub assembly_path: Option<PathBuf>,
    pub generated_files_output_directory: Option<PathBuf>,
}

/// Tracked project configuration. Every field here is a diff dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ProjectConfig {
    pub name: String,
    pub assembly_name: String,
    pub parse_options: OptionSet,
    pub compilation_options: OptionSet,
    pub analyzer_options: OptionSet,
    pub default_namespace: Option<String>,
    pub output_path: Option<PathBuf>,
    pub output_ref_path: Option<PathBuf>,
    pub compilation_output_info: CompilationOutputInfo,
}

impl ProjectConfig {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            assembly_name: name.clone(),
            name,
            ..Self::default()
        }
    }
}

/// Reference lists. Order is not significant for diffing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ProjectReferences {
    pub metadata: Vec<String>,
    pub projects: Vec<ProjectId>,
    pub analyzers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProjectSnapshot {
    id: ProjectId,
    config: ProjectConfig,
    references: ProjectReferences,
    run_analyzers: bool,
    documents: IndexMap<DocumentId, DocumentSnapshot>,
}

impl ProjectSnapshot {
    pub fn new(id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            config: ProjectConfig::named(name),
            references: ProjectReferences::default(),
            run_analyzers: true,
            documents: IndexMap::new(),
        }
    }

    pub fn id(&self) -> ProjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn references(&self) -> &ProjectReferences {
        &self.references
    }

    /// Whether analysis is enabled for this project
    pub fn run_analyzers(&self) -> bool {
        self.run_analyzers
    }

    pub fn with_config(mut self, config: ProjectConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_references(mut self, references: ProjectReferences) -> Self {
        self.references = references;
        self
    }

    pub fn with_run_analyzers(mut self, run_analyzers: bool) -> Self {
        self.run_analyzers = run_analyzers;
        self
    }

    /// Add or replace a document, keeping its position when replacing.
    pub fn with_document(mut self, document: DocumentSnapshot) -> Self {
        if document.project_id() != self.id {
            log::warn!(
                "Ignoring {} for {}: document belongs to another project",
                document.id(),
                self.id
            );
            return self;
        }
        self.documents.insert(document.id(), document);
        self
    }

    pub fn without_document(mut self, id: DocumentId) -> Self {
        self.documents.shift_remove(&id);
        self
    }

    /// Look up a document of any kind
    pub fn document(&self, id: DocumentId) -> Option<&DocumentSnapshot> {
        self.documents.get(&id)
    }

    pub fn contains_document(&self, id: DocumentId) -> bool {
        self.documents.contains_key(&id)
    }

    /// All documents of every kind, in insertion order
    pub fn all_documents(&self) -> impl Iterator<Item = &DocumentSnapshot> {
        self.documents.values()
    }

    pub fn documents(&self) -> impl Iterator<Item = &DocumentSnapshot> {
        self.documents_of(DocumentKind::Source)
    }

    pub fn additional_documents(&self) -> impl Iterator<Item = &DocumentSnapshot> {
        self.documents_of(DocumentKind::Additional)
    }

    pub fn analyzer_config_documents(&self) -> impl Iterator<Item = &DocumentSnapshot> {
        self.documents_of(DocumentKind::AnalyzerConfig)
    }

    fn documents_of(&self, kind: DocumentKind) -> impl Iterator<Item = &DocumentSnapshot> {
        self.documents.values().filter(move |d| d.kind() == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_filtered_by_kind() {
        let pid = ProjectId::from_raw(1);
        let project = ProjectSnapshot::new(pid, "core")
            .with_document(DocumentSnapshot::source(DocumentId::from_raw(pid, 1), "a.cs"))
            .with_document(DocumentSnapshot::new(
                DocumentId::from_raw(pid, 2),
                "notes.txt",
                DocumentKind::Additional,
            ))
            .with_document(DocumentSnapshot::new(
                DocumentId::from_raw(pid, 3),
                ".editorconfig",
                DocumentKind::AnalyzerConfig,
            ));

        assert_eq!(project.documents().count(), 1);
        assert_eq!(project.additional_documents().count(), 1);
        assert_eq!(project.analyzer_config_documents().count(), 1);
        assert_eq!(project.all_documents().count(), 3);
    }

    #[test]
    fn test_foreign_document_is_ignored() {
        let pid = ProjectId::from_raw(1);
        let other = ProjectId::from_raw(2);
        let project = ProjectSnapshot::new(pid, "core")
            .with_document(DocumentSnapshot::source(DocumentId::from_raw(other, 1), "x.cs"));
        assert_eq!(project.all_documents().count(), 0);
    }

    #[test]
    fn test_replacing_document_keeps_position() {
        let pid = ProjectId::from_raw(1);
        let a = DocumentSnapshot::source(DocumentId::from_raw(pid, 1), "a.cs");
        let b = DocumentSnapshot::source(DocumentId::from_raw(pid, 2), "b.cs");
        let project = ProjectSnapshot::new(pid, "core")
            .with_document(a.clone())
            .with_document(b)
            .with_document(a.with_version(VersionStamp::from_raw(5)));

        let names: Vec<_> = project.documents().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["a.cs", "b.cs"]);
        assert_eq!(
            project.document(a.id()).map(|d| d.version()),
            Some(VersionStamp::from_raw(5))
        );
    }

    #[test]
    fn test_named_config_defaults_assembly_name() {
        let config = ProjectConfig::named("lib");
        assert_eq!(config.assembly_name, "lib");
        assert!(config.parse_options.is_empty());
    }
}

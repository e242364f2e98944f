//
// remote/protocol.rs
//
// Messages exchanged with the analysis worker
//

use serde::{Deserialize, Serialize};

use crate::crawler::{InvocationReasons, Scope, WorkItem};
use crate::error::Result;
use crate::find_symbols::{
    DocumentSpan, FindReferencesSearchOptions, ReferenceLocation, SearchCompletion,
    SerializableSymbol, SymbolInfo,
};
use crate::snapshot::{Checksum, DocumentId, ProjectId, SymbolId};

/// One call to the worker. The snapshot travels by checksum only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub checksum: Checksum,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    SolutionEvent {
        reasons: InvocationReasons,
    },
    ProjectEvent {
        project: ProjectId,
        reasons: InvocationReasons,
    },
    DocumentEvent {
        document: DocumentId,
        reasons: InvocationReasons,
    },
    FindReferences {
        symbol: SerializableSymbol,
        documents: Option<Vec<DocumentId>>,
        options: FindReferencesSearchOptions,
    },
    FindReferencesInDocuments {
        symbol: SerializableSymbol,
        documents: Vec<DocumentSpan>,
        options: FindReferencesSearchOptions,
    },
}

impl RemoteRequest {
    pub fn new(checksum: Checksum, operation: Operation) -> Self {
        Self {
            checksum,
            operation,
        }
    }

    /// Crawler event for a work item, against the item's own snapshot
    pub fn for_work_item(item: &WorkItem, checksum: Checksum) -> Self {
        let reasons = item.reasons();
        let operation = match item.scope() {
            Scope::WholeSolution => Operation::SolutionEvent { reasons },
            Scope::Project(project) => Operation::ProjectEvent { project, reasons },
            Scope::Document(document) => Operation::DocumentEvent { document, reasons },
        };
        Self::new(checksum, operation)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Streamed back from the worker during a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReferenceMessage {
    DefinitionFound {
        symbol: SymbolInfo,
    },
    ReferenceFound {
        definition: SymbolId,
        location: ReferenceLocation,
    },
    /// Sent once, last
    Completed {
        completion: SearchCompletion,
    },
}

//
// lib.rs
//
// Incremental change propagation and remote dispatch for workspace analysis.
//
// Workspace mutations flow through the crawler (event listener, coalescing
// queue, solution differ, dispatcher) toward a remote analysis worker.
// Reference search reuses the same remote-or-local dispatch contract.
//

pub mod config;
pub mod crawler;
pub mod error;
pub mod events;
pub mod find_symbols;
pub mod perf;
pub mod remote;
pub mod snapshot;
pub mod workspace;

// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;


pub use config::CrawlerConfig;
pub use error::{CrawlerError, Result};
pub use events::{ChangeEvent, DocumentEvent, WorkspaceChange, WorkspaceChangeKind};
pub use snapshot::{
    Checksum, DocumentId, DocumentKind, DocumentSnapshot, ProjectId, ProjectSnapshot, Solution,
    SymbolId, VersionStamp, WorkspaceId,
};
pub use workspace::{Subscription, Workspace, WorkspaceObserver};

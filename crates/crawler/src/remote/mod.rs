//
// remote/mod.rs
//
// Remote worker protocol, acquisition and the in-process worker
//

pub mod host;
pub mod protocol;
pub mod store;
pub mod worker;

pub use host::{RemoteClient, RemoteHost, UnavailableHost};
pub use protocol::{Operation, ReferenceMessage, RemoteRequest};
pub use store::SnapshotStore;
pub use worker::{InProcessHost, InProcessWorker, RemoteService};

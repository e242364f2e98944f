//
// snapshot/mod.rs
//
// Immutable workspace, project and document snapshots
//

pub mod ids;
pub mod project;
pub mod solution;

pub use ids::*;
pub use project::*;
pub use solution::*;

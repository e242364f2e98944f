//
// crawler/mod.rs
//
// Solution crawler: from workspace notifications to remote work items
//
// mutation -> WorkspaceEventListener -> CoalescingWorkQueue
//          -> (flush) differ -> Dispatcher -> remote worker
//

pub mod differ;
pub mod dispatcher;
pub mod listener;
pub mod queue;
pub mod reasons;
pub mod work_item;

pub use differ::{diff_event, diff_project, diff_solutions, diff_workspace_change, project_reasons};
pub use dispatcher::{DispatchOutcome, Dispatcher, Route};
pub use listener::{CrawlerEventProcessor, WorkspaceEventListener};
pub use queue::{BatchProcessor, CoalescingWorkQueue};
pub use reasons::InvocationReasons;
pub use work_item::{Scope, WorkItem};

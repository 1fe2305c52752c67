//! Action dispatch
//!
//! Named operations are registered in an [`ActionRegistry`] and executed by
//! the [`ActionDispatcher`], inline or as jobs tracked by the [`JobTracker`].
//! The `confirm` flag on an [`Action`] is carried but not enforced.

mod dispatcher;
mod jobs;
mod registry;
mod types;

pub use dispatcher::ActionDispatcher;
pub use jobs::{JobLimits, JobTracker};
pub use registry::{ActionRegistry, FnHandler, ToolHandler, ToolInfo, handler_fn};
pub use types::{
    Action, ActionResult, AsyncAccepted, Job, JobStatus, Meta, Params, ResultStatus,
};

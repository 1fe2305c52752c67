//! Action dispatcher
//!
//! Resolves handlers by type and runs them either inline or as tracked
//! background jobs. Every handler runs inside its own task, so an error or a
//! panic is turned into a structured failure instead of reaching the caller.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use super::jobs::JobTracker;
use super::registry::{ActionRegistry, ToolHandler, ToolInfo};
use super::types::{Action, ActionResult, Job, Params, Meta};

/// Validates and executes actions against an [`ActionRegistry`]
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    registry: Arc<ActionRegistry>,
    jobs: Arc<JobTracker>,
    permits: Arc<Semaphore>,
}

impl ActionDispatcher {
    #[must_use]
    pub fn new(registry: Arc<ActionRegistry>, jobs: Arc<JobTracker>) -> Self {
        let permits = Arc::new(Semaphore::new(jobs.limits().max_concurrent.max(1)));
        Self {
            registry,
            jobs,
            permits,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn jobs(&self) -> &Arc<JobTracker> {
        &self.jobs
    }

    /// True iff a handler is registered for `kind`
    #[must_use]
    pub fn is_valid_action(&self, kind: &str) -> bool {
        self.registry.contains(kind)
    }

    /// Register or replace a handler
    pub fn register_tool(&self, info: ToolInfo, handler: Arc<dyn ToolHandler>) {
        self.registry.register(info, handler);
    }

    /// Run an action to completion
    ///
    /// Never fails: unknown types and handler failures come back as
    /// `status: "error"` results tagged with the action id.
    pub async fn execute_sync(&self, action: &Action) -> ActionResult {
        match self.invoke(action).await {
            Ok(result) => {
                tracing::debug!(action_id = %action.id, kind = %action.kind, "action completed");
                ActionResult::completed(&action.id, result)
            }
            Err(error) => {
                tracing::warn!(action_id = %action.id, kind = %action.kind, error = %error, "action failed");
                ActionResult::failed(&action.id, error)
            }
        }
    }

    /// Queue an action as a background job and return its id immediately
    pub async fn execute_async(&self, action: Action) -> String {
        let job = self.jobs.create(&action.id).await;
        let job_id = job.id.clone();

        tracing::info!(job_id = %job_id, action_id = %action.id, kind = %action.kind, "scheduled background action");

        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.run_job(&job.id, &action).await });

        job_id
    }

    /// Latest job record; never waits for the job to finish
    pub async fn get_job_status(&self, job_id: &str) -> Option<Job> {
        self.jobs.get(job_id).await
    }

    async fn run_job(&self, job_id: &str, action: &Action) {
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            self.jobs
                .mark_failed(job_id, "dispatcher is shutting down".to_string())
                .await;
            return;
        };

        self.jobs.mark_running(job_id).await;

        match self.invoke(action).await {
            Ok(result) => {
                self.jobs.mark_succeeded(job_id, result).await;
                tracing::info!(job_id, action_id = %action.id, "background action succeeded");
            }
            Err(error) => {
                tracing::warn!(job_id, action_id = %action.id, error = %error, "background action failed");
                self.jobs.mark_failed(job_id, error).await;
            }
        }
    }

    async fn invoke(&self, action: &Action) -> Result<Value, String> {
        let Some(handler) = self.registry.handler(&action.kind) else {
            return Err(format!("Unknown action type: {}", action.kind));
        };

        if action.confirm {
            tracing::debug!(action_id = %action.id, kind = %action.kind, "confirm flag set; executing without gating");
        }

        run_contained(handler, action.params.clone(), action.meta.clone()).await
    }
}

/// Run a handler in its own task so panics stay inside it
async fn run_contained(
    handler: Arc<dyn ToolHandler>,
    params: Params,
    meta: Meta,
) -> Result<Value, String> {
    match tokio::spawn(async move { handler.call(params, meta).await }).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(e) if e.is_panic() => Err(panic_message(e.into_panic().as_ref())),
        Err(e) => Err(format!("handler cancelled: {e}")),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

//! Shared test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;

use cadence_gateway::actions::{ActionDispatcher, ActionRegistry, JobLimits, JobTracker};
use cadence_gateway::agent::{ConversationContext, Responder};
use cadence_gateway::api::ApiServerBuilder;
use cadence_gateway::conversation::{
    SessionRegistry, StateChange, StateListener, TurnState, TurnTimings,
};
use cadence_gateway::session::SessionServices;
use cadence_gateway::tools::register_builtin_tools;
use cadence_gateway::{Error, Result};

/// Records every `(state, reason)` pair it is notified of
#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<(TurnState, String)>>,
}

impl Recorder {
    pub fn seen(&self) -> Vec<(TurnState, String)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<TurnState> {
        self.seen().into_iter().map(|(state, _)| state).collect()
    }
}

#[async_trait]
impl StateListener for Recorder {
    async fn on_state_change(&self, change: &StateChange) -> Result<()> {
        self.seen
            .lock()
            .unwrap()
            .push((change.state, change.reason.clone()));
        Ok(())
    }
}

/// Replies with a fixed string
pub struct ScriptedResponder(pub String);

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(&self, _text: &str, _context: &ConversationContext) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Always fails
pub struct BrokenResponder;

#[async_trait]
impl Responder for BrokenResponder {
    async fn respond(&self, _text: &str, _context: &ConversationContext) -> Result<String> {
        Err(Error::Agent("model unavailable".to_string()))
    }
}

/// Dispatcher over the built-in tools
pub fn builtin_dispatcher() -> ActionDispatcher {
    let registry = ActionRegistry::new();
    register_builtin_tools(&registry);
    ActionDispatcher::new(
        Arc::new(registry),
        Arc::new(JobTracker::new(JobLimits::default())),
    )
}

/// Text-only services over the built-in tools
pub fn text_services(responder: Arc<dyn Responder>) -> SessionServices {
    SessionServices::new(
        Arc::new(SessionRegistry::new(TurnTimings::default())),
        builtin_dispatcher(),
        responder,
    )
}

/// Router over text-only services
pub fn build_test_router(developer_mode: bool, api_key: Option<&str>) -> (Router, SessionServices) {
    let services = text_services(Arc::new(ScriptedResponder("ok".to_string())));
    let server = ApiServerBuilder::new(services.clone())
        .api_key(api_key.map(ToString::to_string))
        .developer_mode(developer_mode)
        .build();
    (server.router(), services)
}

//! State change notification contract

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::TurnState;
use crate::Result;

/// A completed transition, delivered to every registered listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub session_id: String,
    pub state: TurnState,
    pub previous: TurnState,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Receives state changes from a [`super::TurnStateMachine`]
///
/// Each invocation runs as its own task. An error, a panic, or running past
/// the configured listener timeout is logged and does not affect other
/// listeners or the transition itself.
#[async_trait]
pub trait StateListener: Send + Sync {
    /// Called once per transition, in registration order
    ///
    /// # Errors
    ///
    /// Returned errors are logged by the machine and otherwise ignored
    async fn on_state_change(&self, change: &StateChange) -> Result<()>;
}

/// Handle returned by `add_listener`, used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

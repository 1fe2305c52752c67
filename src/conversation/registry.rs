//! Session id to state machine map

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{TurnStateMachine, TurnTimings};

/// A session's machine and the number of connections driving it
#[derive(Debug)]
struct Entry {
    machine: TurnStateMachine,
    holders: usize,
}

/// Owns one [`TurnStateMachine`] per connected session
///
/// Connections sharing a session id share its machine. The entry lives
/// until the last connection that acquired it releases it.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Entry>>,
    timings: TurnTimings,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(timings: TurnTimings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timings,
        }
    }

    /// Look up the machine for a session, creating it on first use
    ///
    /// Does not count as a holder; see [`Self::acquire`].
    pub async fn get_or_create(&self, session_id: &str) -> TurnStateMachine {
        if let Some(entry) = self.sessions.read().await.get(session_id) {
            return entry.machine.clone();
        }

        let mut sessions = self.sessions.write().await;
        self.entry(&mut sessions, session_id).machine.clone()
    }

    /// Attach a connection to a session, creating its machine on first use
    pub async fn acquire(&self, session_id: &str) -> TurnStateMachine {
        let mut sessions = self.sessions.write().await;
        let entry = self.entry(&mut sessions, session_id);
        entry.holders += 1;
        tracing::debug!(session_id, holders = entry.holders, "session acquired");
        entry.machine.clone()
    }

    /// Detach a connection; the machine is dropped once no holder remains
    ///
    /// Returns whether the entry was removed.
    pub async fn release(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(session_id) else {
            return false;
        };

        entry.holders = entry.holders.saturating_sub(1);
        if entry.holders > 0 {
            tracing::debug!(session_id, holders = entry.holders, "session still held");
            return false;
        }

        sessions.remove(session_id);
        tracing::debug!(session_id, "removed turn state machine");
        true
    }

    pub async fn get(&self, session_id: &str) -> Option<TurnStateMachine> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| entry.machine.clone())
    }

    /// Drop a session's machine regardless of holders; pending follow-ups are abandoned
    pub async fn remove(&self, session_id: &str) -> Option<TurnStateMachine> {
        let removed = self.sessions.write().await.remove(session_id);
        if removed.is_some() {
            tracing::debug!(session_id, "removed turn state machine");
        }
        removed.map(|entry| entry.machine)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn entry<'a>(&self, sessions: &'a mut HashMap<String, Entry>, session_id: &str) -> &'a mut Entry {
        sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::debug!(session_id, "created turn state machine");
            Entry {
                machine: TurnStateMachine::new(session_id, self.timings),
                holders: 0,
            }
        })
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(TurnTimings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::TurnState;

    #[tokio::test]
    async fn sessions_are_independent() {
        let registry = SessionRegistry::default();
        let a = registry.get_or_create("a").await;
        let b = registry.get_or_create("b").await;

        a.transition(TurnState::Speaking, "test").await;

        assert_eq!(a.get_state(), TurnState::Speaking);
        assert_eq!(b.get_state(), TurnState::Idle);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn get_or_create_returns_same_machine() {
        let registry = SessionRegistry::default();
        let first = registry.get_or_create("a").await;
        first.transition(TurnState::Thinking, "test").await;

        let second = registry.get_or_create("a").await;
        assert_eq!(second.get_state(), TurnState::Thinking);
    }

    #[tokio::test]
    async fn remove_forgets_session() {
        let registry = SessionRegistry::default();
        registry.get_or_create("a").await;

        assert!(registry.remove("a").await.is_some());
        assert!(registry.remove("a").await.is_none());
        assert!(registry.get("a").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn shared_session_outlives_first_release() {
        let registry = SessionRegistry::default();
        let first = registry.acquire("a").await;
        let second = registry.acquire("a").await;
        second.transition(TurnState::Speaking, "test").await;

        assert!(!registry.release("a").await);
        let live = registry.get("a").await.unwrap();
        assert_eq!(live.get_state(), TurnState::Speaking);
        assert_eq!(registry.acquire("a").await.get_state(), TurnState::Speaking);
        drop(first);

        assert!(!registry.release("a").await);
        assert!(registry.release("a").await);
        assert!(registry.get("a").await.is_none());
        assert!(!registry.release("a").await);
    }
}

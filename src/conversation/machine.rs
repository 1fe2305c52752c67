//! Per-session turn-taking state machine
//!
//! Transitions are serialized by a FIFO async mutex that also holds the
//! transition epoch. The current and previous states live in atomics so
//! readers never wait on a transition in progress.
//!
//! Two-step operations (wake word, barge-in, forced interrupt, error
//! recovery) schedule their second step after a delay. The second step only
//! fires if no other transition happened in between, so a later event always
//! wins over a stale follow-up.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use super::listener::{ListenerId, StateChange, StateListener};
use super::TurnState;

/// Sentinel stored in `previous` before the first transition
const NO_PREVIOUS: u8 = u8::MAX;

/// Delays that shape the observable ordering of two-step operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTimings {
    /// Wake word detected to listening
    pub wake_cleanup: Duration,
    /// Interrupted to listening
    pub interrupt: Duration,
    /// Listening with no activity before dropping back to idle
    pub idle_grace: Duration,
    /// Error recovery to idle
    pub recovery: Duration,
    /// Upper bound on a single listener invocation
    pub listener_timeout: Duration,
}

impl Default for TurnTimings {
    fn default() -> Self {
        Self {
            wake_cleanup: Duration::from_millis(100),
            interrupt: Duration::from_millis(50),
            idle_grace: Duration::from_secs(10),
            recovery: Duration::from_secs(2),
            listener_timeout: Duration::from_secs(2),
        }
    }
}

type Listeners = Vec<(ListenerId, Arc<dyn StateListener>)>;

struct Inner {
    session_id: String,
    timings: TurnTimings,
    state: AtomicU8,
    previous: AtomicU8,
    /// Transition guard, holding the count of real transitions so far
    guard: Mutex<u64>,
    listeners: RwLock<Listeners>,
    next_listener: AtomicU64,
}

/// Authoritative turn-taking state for one conversation session
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct TurnStateMachine {
    inner: Arc<Inner>,
}

impl fmt::Debug for TurnStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnStateMachine")
            .field("session_id", &self.inner.session_id)
            .field("state", &self.get_state())
            .field("previous", &self.previous_state())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl TurnStateMachine {
    /// Create a machine in the idle state
    #[must_use]
    pub fn new(session_id: impl Into<String>, timings: TurnTimings) -> Self {
        Self {
            inner: Arc::new(Inner {
                session_id: session_id.into(),
                timings,
                state: AtomicU8::new(TurnState::Idle.as_u8()),
                previous: AtomicU8::new(NO_PREVIOUS),
                guard: Mutex::new(0),
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    #[must_use]
    pub fn timings(&self) -> &TurnTimings {
        &self.inner.timings
    }

    /// Current state, read without taking the transition guard
    #[must_use]
    pub fn get_state(&self) -> TurnState {
        TurnState::from_u8(self.inner.state.load(Ordering::Acquire)).unwrap_or(TurnState::Idle)
    }

    /// State before the most recent transition, if any
    #[must_use]
    pub fn previous_state(&self) -> Option<TurnState> {
        TurnState::from_u8(self.inner.previous.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.get_state().is_listening()
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.get_state().is_speaking()
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.get_state().is_interrupted()
    }

    #[must_use]
    pub fn can_speak(&self) -> bool {
        self.get_state().can_speak()
    }

    #[must_use]
    pub fn can_listen(&self) -> bool {
        self.get_state().can_listen()
    }

    #[must_use]
    pub fn should_stop_tts(&self) -> bool {
        self.get_state().should_stop_tts()
    }

    /// Register a listener for every subsequent transition
    pub fn add_listener(&self, listener: Arc<dyn StateListener>) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        tracing::debug!(session_id = %self.inner.session_id, listener = %id, "listener added");
        id
    }

    /// Remove a listener, returning true if it was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        let removed = listeners.len() != before;
        drop(listeners);

        if removed {
            tracing::debug!(session_id = %self.inner.session_id, listener = %id, "listener removed");
        }
        removed
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Move to `new_state`, notifying listeners
    ///
    /// Returns false without notifying anyone when already in `new_state`.
    pub async fn transition(&self, new_state: TurnState, reason: &str) -> bool {
        let mut epoch = self.inner.guard.lock().await;
        self.apply(&mut epoch, new_state, reason).await
    }

    /// Wake word heard; interrupts playback if the assistant is talking
    pub async fn handle_wakeword(&self) {
        let mark = {
            let mut epoch = self.inner.guard.lock().await;
            if self.get_state() == TurnState::Speaking {
                self.apply(&mut epoch, TurnState::Interrupted, "wake word during speech")
                    .await;
            } else {
                self.apply(&mut epoch, TurnState::WakewordDetected, "wake word detected")
                    .await;
            }
            *epoch
        };

        self.follow_up(
            mark,
            self.inner.timings.wake_cleanup,
            TurnState::Listening,
            "auto-start after wake word",
        )
        .await;
    }

    /// User started talking
    pub async fn handle_speech_start(&self) {
        let mark = {
            let mut epoch = self.inner.guard.lock().await;
            match self.get_state() {
                TurnState::Idle | TurnState::WakewordDetected => {
                    self.apply(&mut epoch, TurnState::Listening, "user speech detected")
                        .await;
                    return;
                }
                TurnState::Speaking => {
                    self.apply(&mut epoch, TurnState::Interrupted, "user interrupted")
                        .await;
                    *epoch
                }
                other => {
                    self.ignored("speech start", other);
                    return;
                }
            }
        };

        self.follow_up(
            mark,
            self.inner.timings.interrupt,
            TurnState::Listening,
            "listening after interrupt",
        )
        .await;
    }

    /// User stopped talking, utterance is ready
    pub async fn handle_speech_end(&self) {
        let mut epoch = self.inner.guard.lock().await;
        match self.get_state() {
            TurnState::Listening => {
                self.apply(&mut epoch, TurnState::Thinking, "processing user input")
                    .await;
            }
            other => self.ignored("speech end", other),
        }
    }

    /// Response generation started
    pub async fn handle_llm_start(&self) {
        let mut epoch = self.inner.guard.lock().await;
        match self.get_state() {
            TurnState::Thinking | TurnState::Listening => {
                self.apply(&mut epoch, TurnState::Thinking, "LLM generating response")
                    .await;
            }
            other => self.ignored("llm start", other),
        }
    }

    /// Playback of a response started
    pub async fn handle_tts_start(&self) {
        let mut epoch = self.inner.guard.lock().await;
        match self.get_state() {
            TurnState::Thinking | TurnState::Listening => {
                self.apply(&mut epoch, TurnState::Speaking, "speaking response")
                    .await;
            }
            other => self.ignored("tts start", other),
        }
    }

    /// Playback finished; arms the idle watchdog
    pub async fn handle_tts_end(&self) {
        let mark = {
            let mut epoch = self.inner.guard.lock().await;
            match self.get_state() {
                TurnState::Speaking => {
                    self.apply(
                        &mut epoch,
                        TurnState::Listening,
                        "finished speaking, ready for next",
                    )
                    .await;
                    *epoch
                }
                other => {
                    self.ignored("tts end", other);
                    return;
                }
            }
        };

        self.schedule(
            mark,
            self.inner.timings.idle_grace,
            TurnState::Idle,
            "timeout - returning to background",
        );
    }

    /// A turn failed; recovers to idle in the background
    pub async fn handle_error(&self, message: &str) {
        let mark = {
            let mut epoch = self.inner.guard.lock().await;
            self.apply(&mut epoch, TurnState::ErrorRecovery, &format!("error: {message}"))
                .await;
            *epoch
        };

        self.schedule(
            mark,
            self.inner.timings.recovery,
            TurnState::Idle,
            "recovered from error",
        );
    }

    /// Emergency stop; only affects conversation state
    pub async fn force_interrupt(&self) {
        tracing::warn!(session_id = %self.inner.session_id, "force interrupt");
        let mark = {
            let mut epoch = self.inner.guard.lock().await;
            self.apply(&mut epoch, TurnState::Interrupted, "force interrupt")
                .await;
            *epoch
        };

        self.follow_up(
            mark,
            self.inner.timings.interrupt,
            TurnState::Listening,
            "listening after force interrupt",
        )
        .await;
    }

    /// Perform a transition while holding the guard
    async fn apply(&self, epoch: &mut u64, new_state: TurnState, reason: &str) -> bool {
        let current = self.get_state();
        if current == new_state {
            tracing::trace!(
                session_id = %self.inner.session_id,
                state = %current,
                reason,
                "already in requested state"
            );
            return false;
        }

        self.inner.previous.store(current.as_u8(), Ordering::Release);
        self.inner.state.store(new_state.as_u8(), Ordering::Release);
        *epoch += 1;

        tracing::info!(
            session_id = %self.inner.session_id,
            from = %current,
            to = %new_state,
            reason,
            "state transition"
        );

        self.notify(StateChange {
            session_id: self.inner.session_id.clone(),
            state: new_state,
            previous: current,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        })
        .await;

        true
    }

    /// Deliver a change to every listener, each in its own task
    async fn notify(&self, change: StateChange) {
        let listeners: Listeners = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in listeners {
            let change = change.clone();
            let mut task = tokio::spawn(async move { listener.on_state_change(&change).await });

            match tokio::time::timeout(self.inner.timings.listener_timeout, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    tracing::warn!(session_id = %self.inner.session_id, listener = %id, error = %e, "state listener failed");
                }
                Ok(Err(e)) => {
                    tracing::error!(session_id = %self.inner.session_id, listener = %id, error = %e, "state listener panicked");
                }
                Err(_) => {
                    task.abort();
                    tracing::warn!(
                        session_id = %self.inner.session_id,
                        listener = %id,
                        timeout_ms = u64::try_from(self.inner.timings.listener_timeout.as_millis()).unwrap_or(u64::MAX),
                        "state listener timed out"
                    );
                }
            }
        }
    }

    /// Wait, then transition unless something else moved the machine first
    async fn follow_up(&self, mark: u64, delay: Duration, state: TurnState, reason: &str) {
        tokio::time::sleep(delay).await;

        let mut epoch = self.inner.guard.lock().await;
        if *epoch != mark {
            tracing::debug!(
                session_id = %self.inner.session_id,
                skipped = %state,
                reason,
                "follow-up superseded by a newer transition"
            );
            return;
        }
        self.apply(&mut epoch, state, reason).await;
    }

    /// Run a follow-up in the background without keeping the session alive
    fn schedule(&self, mark: u64, delay: Duration, state: TurnState, reason: &'static str) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                let machine = Self { inner };
                machine.follow_up(mark, Duration::ZERO, state, reason).await;
            }
        });
    }

    fn ignored(&self, operation: &str, state: TurnState) {
        tracing::debug!(
            session_id = %self.inner.session_id,
            operation,
            state = %state,
            "operation not valid in current state, ignoring"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: StdMutex<Vec<(TurnState, String)>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<(TurnState, String)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StateListener for Recorder {
        async fn on_state_change(&self, change: &StateChange) -> crate::Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push((change.state, change.reason.clone()));
            Ok(())
        }
    }

    fn machine_with_recorder() -> (TurnStateMachine, Arc<Recorder>) {
        let machine = TurnStateMachine::new("test", TurnTimings::default());
        let recorder = Arc::new(Recorder::default());
        machine.add_listener(recorder.clone());
        (machine, recorder)
    }

    #[tokio::test]
    async fn starts_idle_without_previous() {
        let machine = TurnStateMachine::new("s", TurnTimings::default());
        assert_eq!(machine.get_state(), TurnState::Idle);
        assert_eq!(machine.previous_state(), None);
    }

    #[tokio::test]
    async fn repeated_transition_is_silent() {
        let (machine, recorder) = machine_with_recorder();
        assert!(machine.transition(TurnState::Thinking, "first").await);
        assert!(!machine.transition(TurnState::Thinking, "again").await);

        assert_eq!(recorder.seen().len(), 1);
        assert_eq!(machine.previous_state(), Some(TurnState::Idle));
    }

    #[tokio::test]
    async fn speech_end_outside_listening_is_ignored() {
        let (machine, recorder) = machine_with_recorder();
        machine.handle_speech_end().await;
        assert_eq!(machine.get_state(), TurnState::Idle);
        assert!(recorder.seen().is_empty());
    }

    #[tokio::test]
    async fn llm_start_from_listening() {
        let (machine, recorder) = machine_with_recorder();
        machine.transition(TurnState::Listening, "setup").await;
        machine.handle_llm_start().await;
        assert_eq!(machine.get_state(), TurnState::Thinking);
        assert_eq!(
            recorder.seen().last().unwrap(),
            &(TurnState::Thinking, "LLM generating response".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn removed_listener_stops_receiving() {
        let machine = TurnStateMachine::new("s", TurnTimings::default());
        let recorder = Arc::new(Recorder::default());
        let id = machine.add_listener(recorder.clone());

        machine.transition(TurnState::Listening, "one").await;
        assert!(machine.remove_listener(id));
        assert!(!machine.remove_listener(id));
        machine.transition(TurnState::Thinking, "two").await;

        assert_eq!(recorder.seen().len(), 1);
        assert_eq!(machine.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn error_recovers_to_idle_in_background() {
        let (machine, recorder) = machine_with_recorder();
        machine.handle_error("boom").await;
        assert_eq!(machine.get_state(), TurnState::ErrorRecovery);

        tokio::time::sleep(Duration::from_millis(2100)).await;

        assert_eq!(machine.get_state(), TurnState::Idle);
        assert_eq!(
            recorder.seen(),
            vec![
                (TurnState::ErrorRecovery, "error: boom".to_string()),
                (TurnState::Idle, "recovered from error".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_yields_to_newer_activity() {
        let (machine, _recorder) = machine_with_recorder();
        machine.handle_error("boom").await;
        machine.handle_wakeword().await;
        assert_eq!(machine.get_state(), TurnState::Listening);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(machine.get_state(), TurnState::Listening);
    }

    struct LateListener {
        finished: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl StateListener for LateListener {
        async fn on_state_change(&self, _change: &StateChange) -> crate::Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.finished
                .store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_listener_is_cancelled() {
        let machine = TurnStateMachine::new("s", TurnTimings::default());
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        machine.add_listener(Arc::new(LateListener {
            finished: finished.clone(),
        }));

        assert!(machine.transition(TurnState::Listening, "slow").await);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(!finished.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_machine_cancels_pending_recovery() {
        let (machine, recorder) = machine_with_recorder();
        machine.handle_error("gone").await;
        drop(machine);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(recorder.seen().len(), 1);
    }
}

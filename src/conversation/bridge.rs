//! Hand-off from foreign threads into the async runtime
//!
//! Blocking producers (the wake word engine thread) never touch a state
//! machine. They push [`VoiceEvent`]s into an [`EventSender`], and the
//! session task drains the matching [`EventReceiver`].

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Event raised outside the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    /// A wake phrase was heard
    WakeWord {
        phrase: String,
        detected_at: DateTime<Utc>,
    },
    /// The engine thread exited
    EngineStopped { error: Option<String> },
}

/// Thread-safe sending half; `send` never blocks and needs no runtime
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<VoiceEvent>,
}

impl EventSender {
    /// Queue an event, returning false if the session is gone
    pub fn send(&self, event: VoiceEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Receiving half, owned by the session task
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<VoiceEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<VoiceEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll, used in tests and shutdown paths
    pub fn try_recv(&mut self) -> Option<VoiceEvent> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected sender/receiver pair
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_cross_from_std_thread() {
        let (tx, mut rx) = channel();

        std::thread::spawn(move || {
            tx.send(VoiceEvent::WakeWord {
                phrase: "hey cadence".to_string(),
                detected_at: Utc::now(),
            })
        })
        .join()
        .unwrap();

        match rx.recv().await {
            Some(VoiceEvent::WakeWord { phrase, .. }) => assert_eq!(phrase, "hey cadence"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn send_after_receiver_dropped_reports_failure() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(!tx.send(VoiceEvent::EngineStopped { error: None }));
    }
}

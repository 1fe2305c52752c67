//! Turn-taking controller
//!
//! One [`TurnStateMachine`] per session arbitrates wake word, speech
//! capture, response generation and playback. Barge-in always passes
//! through [`TurnState::Interrupted`] before listening resumes, so a
//! playback-stopping listener has a single signal to react to.

pub mod bridge;
mod listener;
mod machine;
mod registry;
mod state;

pub use bridge::{EventReceiver, EventSender, VoiceEvent};
pub use listener::{ListenerId, StateChange, StateListener};
pub use machine::{TurnStateMachine, TurnTimings};
pub use registry::SessionRegistry;
pub use state::TurnState;

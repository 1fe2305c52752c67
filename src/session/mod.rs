//! Client sessions over the full-duplex channel

mod messages;
mod orchestrator;

pub use messages::{ClientMessage, ServerMessage};
pub use orchestrator::{SessionOrchestrator, SessionServices, SpotterFactory};

//! Cadence Gateway - full-duplex voice assistant gateway
//!
//! This library provides the core of the Cadence gateway:
//! - Turn-taking state machine per conversation session
//! - Action dispatch with background job tracking
//! - Voice collaborators (wake word, STT, TTS)
//! - HTTP and WebSocket API
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Clients (WebSocket / HTTP)           │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Session orchestrator                │
//! │   Turn state machine  │  Wake word  │  STT / TTS    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Action dispatcher                   │
//! │   Registry  │  Job tracker  │  Built-in + plugins   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod agent;
pub mod api;
pub mod config;
pub mod conversation;
pub mod daemon;
pub mod error;
pub mod plugins;
pub mod session;
pub mod tools;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};

//! Duplex channel message shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::ActionResult;
use crate::conversation::{StateChange, TurnState};

fn default_sensitivity() -> f32 {
    0.5
}

/// Client to server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Client-side voice activity detector fired
    VadDetected,
    /// Base64 PCM16LE mono 16kHz frame
    AudioStream { audio: String },
    /// Typed turn
    Message { text: String },
    /// Playback of the last response finished
    TtsEnded,
    Interrupt,
    WakeWordEnable {
        #[serde(default = "default_sensitivity")]
        sensitivity: f32,
    },
    WakeWordDisable,
    GetState,
    /// Start push-to-talk capture
    VoiceStart,
    /// End push-to-talk capture and transcribe it
    VoiceStop,
    Ping,
}

/// Server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        session_id: String,
    },
    StateChange {
        state: TurnState,
        reason: String,
        is_speaking: bool,
        is_listening: bool,
        timestamp: DateTime<Utc>,
    },
    AudioProcessed {
        wake_word_detected: bool,
        voice_activity: bool,
        transcription: String,
        state: TurnState,
    },
    Response {
        text: String,
        /// Base64 encoded synthesized speech
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        actions: Vec<ActionResult>,
        state: TurnState,
    },
    /// Stop playback now
    Interrupt {
        reason: String,
    },
    Interrupted {
        state: TurnState,
    },
    WakeWordStatus {
        enabled: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        sensitivity: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    WakeWordDetected {
        timestamp: DateTime<Utc>,
    },
    StateInfo {
        state: TurnState,
        is_speaking: bool,
        is_listening: bool,
        wakeword_active: bool,
    },
    ListeningStarted,
    Transcription {
        text: String,
    },
    Error {
        code: String,
        message: String,
    },
    Pong,
}

impl ServerMessage {
    #[must_use]
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<&StateChange> for ServerMessage {
    fn from(change: &StateChange) -> Self {
        Self::StateChange {
            state: change.state,
            reason: change.reason.clone(),
            is_speaking: change.state.is_speaking(),
            is_listening: change.state.is_listening(),
            timestamp: change.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn client_messages_use_type_tag() {
        let msg: ClientMessage = serde_json::from_value(json!({"type": "wake_word_enable"})).unwrap();
        assert_eq!(msg, ClientMessage::WakeWordEnable { sensitivity: 0.5 });

        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "message", "text": "hi"})).unwrap();
        assert_eq!(msg, ClientMessage::Message { text: "hi".to_string() });

        assert!(serde_json::from_value::<ClientMessage>(json!({"type": "dance"})).is_err());
    }

    #[test]
    fn state_change_carries_flags() {
        let change = StateChange {
            session_id: "s1".to_string(),
            state: TurnState::Speaking,
            previous: TurnState::Thinking,
            reason: "speaking response".to_string(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(ServerMessage::from(&change)).unwrap();
        assert_eq!(value["type"], "state_change");
        assert_eq!(value["state"], "speaking");
        assert_eq!(value["is_speaking"], true);
        assert_eq!(value["is_listening"], false);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let value = serde_json::to_value(ServerMessage::WakeWordStatus {
            enabled: false,
            sensitivity: None,
            error: None,
        })
        .unwrap();
        assert_eq!(value, json!({"type": "wake_word_status", "enabled": false}));
        assert_eq!(serde_json::to_value(ServerMessage::Pong).unwrap(), json!({"type": "pong"}));
    }
}

//! Turn-taking states and the flags derived from them

use std::fmt;

use serde::{Deserialize, Serialize};

/// The single active turn-taking state of a conversation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TurnState {
    /// Passive, waiting for a wake word or speech
    Idle = 0,
    /// Wake word heard, audio pipeline settling
    WakewordDetected = 1,
    /// Capturing user speech
    Listening = 2,
    /// Generating a response
    Thinking = 3,
    /// Playing back a synthesized response
    Speaking = 4,
    /// Playback cut off by the user
    Interrupted = 5,
    /// Recovering from a failed turn
    ErrorRecovery = 6,
}

impl TurnState {
    /// Every state, in declaration order
    pub const ALL: [Self; 7] = [
        Self::Idle,
        Self::WakewordDetected,
        Self::Listening,
        Self::Thinking,
        Self::Speaking,
        Self::Interrupted,
        Self::ErrorRecovery,
    ];

    /// Wire name of the state
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WakewordDetected => "wakeword_detected",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Interrupted => "interrupted",
            Self::ErrorRecovery => "error_recovery",
        }
    }

    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Idle),
            1 => Some(Self::WakewordDetected),
            2 => Some(Self::Listening),
            3 => Some(Self::Thinking),
            4 => Some(Self::Speaking),
            5 => Some(Self::Interrupted),
            6 => Some(Self::ErrorRecovery),
            _ => None,
        }
    }

    /// Capturing (or about to capture) user speech
    #[must_use]
    pub const fn is_listening(self) -> bool {
        matches!(self, Self::Listening | Self::WakewordDetected)
    }

    #[must_use]
    pub const fn is_speaking(self) -> bool {
        matches!(self, Self::Speaking)
    }

    #[must_use]
    pub const fn is_interrupted(self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Whether playback of a response may start
    #[must_use]
    pub const fn can_speak(self) -> bool {
        matches!(self, Self::Thinking | Self::Listening)
    }

    /// Whether audio capture may start
    #[must_use]
    pub const fn can_listen(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::WakewordDetected | Self::Listening | Self::Interrupted
        )
    }

    /// Whether any in-flight playback must be stopped
    #[must_use]
    pub const fn should_stop_tts(self) -> bool {
        matches!(
            self,
            Self::Interrupted | Self::Listening | Self::WakewordDetected
        )
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Voice collaborators
//!
//! Transcription and synthesis sit behind the [`Transcriber`] and
//! [`Synthesizer`] traits so sessions can run with hosted providers, test
//! doubles, or nothing at all. Wake word spotting runs on its own thread
//! and reports back through the conversation bridge.

mod audio;
mod engine;
mod stt;
mod tts;
mod wake_word;

use async_trait::async_trait;

use crate::Result;

pub use audio::{SAMPLE_RATE, decode_pcm16_base64, rms, samples_to_wav};
pub use engine::{TranscriptSpotter, WakeWordEngine, WakeWordSpotter};
pub use stt::SpeechToText;
pub use tts::TextToSpeech;
pub use wake_word::{MAX_SEGMENT_SAMPLES, SpeechSegmenter, WakeWords};

/// Speech to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV audio
    ///
    /// # Errors
    ///
    /// Returns error if the provider rejects the audio or is unreachable
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Text to speech
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into encoded audio
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

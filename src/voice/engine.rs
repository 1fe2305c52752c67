//! Wake word engine thread
//!
//! Frames are segmented by energy on a dedicated thread and each finished
//! segment is handed to a [`WakeWordSpotter`]. Hits are reported as
//! [`VoiceEvent`]s through the session's [`EventSender`]; the thread never
//! touches a state machine directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;

use super::audio::{SAMPLE_RATE, samples_to_wav};
use super::wake_word::{SpeechSegmenter, WakeWords};
use super::Transcriber;
use crate::conversation::{EventSender, VoiceEvent};
use crate::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Consecutive spotter failures before the engine gives up
const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Decides whether a speech segment contained a wake phrase
pub trait WakeWordSpotter: Send {
    /// Returns the matched phrase, if any
    ///
    /// # Errors
    ///
    /// Returns error if the segment could not be analysed
    fn spot(&mut self, segment: &[f32]) -> Result<Option<String>>;
}

/// Spots wake phrases by transcribing the segment and matching the text
pub struct TranscriptSpotter {
    runtime: Handle,
    transcriber: Arc<dyn Transcriber>,
    wake_words: WakeWords,
}

impl TranscriptSpotter {
    #[must_use]
    pub fn new(runtime: Handle, transcriber: Arc<dyn Transcriber>, wake_words: WakeWords) -> Self {
        Self {
            runtime,
            transcriber,
            wake_words,
        }
    }
}

impl WakeWordSpotter for TranscriptSpotter {
    fn spot(&mut self, segment: &[f32]) -> Result<Option<String>> {
        let wav = samples_to_wav(segment, SAMPLE_RATE)?;
        let transcript = self.runtime.block_on(self.transcriber.transcribe(&wav))?;
        Ok(self.wake_words.find(&transcript).map(ToString::to_string))
    }
}

/// Handle to a running engine thread; stopping is idempotent
#[derive(Debug)]
pub struct WakeWordEngine {
    frames: Option<mpsc::Sender<Vec<f32>>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    sensitivity: f32,
}

impl WakeWordEngine {
    /// Spawn the engine thread
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn start(
        spotter: Box<dyn WakeWordSpotter>,
        sensitivity: f32,
        events: EventSender,
    ) -> Result<Self> {
        let sensitivity = sensitivity.clamp(0.0, 1.0);
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let thread = std::thread::Builder::new().name("wake-word".to_string()).spawn({
            let stop = Arc::clone(&stop);
            move || run(spotter, SpeechSegmenter::new(sensitivity), &rx, &stop, &events)
        })?;

        tracing::info!(sensitivity, "wake word engine started");
        Ok(Self {
            frames: Some(tx),
            stop,
            thread: Some(thread),
            sensitivity,
        })
    }

    /// Queue a frame; false once the engine has stopped
    pub fn feed(&self, frame: Vec<f32>) -> bool {
        self.frames.as_ref().is_some_and(|tx| tx.send(frame).is_ok())
    }

    #[must_use]
    pub const fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the thread to exit; does not wait for it
    pub fn stop(&mut self) {
        if self.thread.take().is_some() {
            self.stop.store(true, Ordering::Release);
            self.frames = None;
            tracing::info!("wake word engine stopped");
        }
    }
}

impl Drop for WakeWordEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut spotter: Box<dyn WakeWordSpotter>,
    mut segmenter: SpeechSegmenter,
    frames: &mpsc::Receiver<Vec<f32>>,
    stop: &AtomicBool,
    events: &EventSender,
) {
    let mut failures = 0;

    while !stop.load(Ordering::Acquire) {
        let frame = match frames.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let Some(segment) = segmenter.push(&frame) else {
            continue;
        };

        match spotter.spot(&segment) {
            Ok(Some(phrase)) => {
                failures = 0;
                tracing::info!(phrase = %phrase, "wake word detected");
                let event = VoiceEvent::WakeWord {
                    phrase,
                    detected_at: Utc::now(),
                };
                if !events.send(event) {
                    break;
                }
            }
            Ok(None) => {
                failures = 0;
                tracing::trace!(samples = segment.len(), "segment without wake word");
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(error = %e, failures, "wake word spotting failed");
                if failures >= MAX_CONSECUTIVE_ERRORS {
                    events.send(VoiceEvent::EngineStopped {
                        error: Some(e.to_string()),
                    });
                    return;
                }
            }
        }
    }

    tracing::debug!("wake word thread exiting");
}

//! Drives one client session over the duplex channel
//!
//! The orchestrator owns the session's listener registration, wake word
//! engine, utterance capture and conversation window. Client messages and
//! bridge events are handled one at a time by the owning task.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::mpsc;

use super::messages::{ClientMessage, ServerMessage};
use crate::actions::ActionDispatcher;
use crate::agent::{ConversationContext, Responder, resolve_inline_tools};
use crate::conversation::{
    EventReceiver, EventSender, ListenerId, SessionRegistry, StateChange, StateListener,
    TurnState, TurnStateMachine, VoiceEvent, bridge,
};
use crate::voice::{
    MAX_SEGMENT_SAMPLES, SAMPLE_RATE, SpeechSegmenter, Synthesizer, Transcriber, WakeWordEngine, WakeWordSpotter,
    WakeWords, decode_pcm16_base64, samples_to_wav,
};
use crate::{Error, Result};

/// Builds a fresh spotter for each enabled wake word engine
pub type SpotterFactory = Arc<dyn Fn() -> Box<dyn WakeWordSpotter> + Send + Sync>;

/// Shared collaborators every session draws on
#[derive(Clone)]
pub struct SessionServices {
    pub sessions: Arc<SessionRegistry>,
    pub dispatcher: ActionDispatcher,
    pub responder: Arc<dyn Responder>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub synthesizer: Option<Arc<dyn Synthesizer>>,
    pub spotter: Option<SpotterFactory>,
    pub wake_words: WakeWords,
    pub context_turns: usize,
}

impl SessionServices {
    /// Text-only services: no transcription, synthesis or wake word engine
    #[must_use]
    pub fn new(
        sessions: Arc<SessionRegistry>,
        dispatcher: ActionDispatcher,
        responder: Arc<dyn Responder>,
    ) -> Self {
        Self {
            sessions,
            dispatcher,
            responder,
            transcriber: None,
            synthesizer: None,
            spotter: None,
            wake_words: WakeWords::new(["hey cadence"]),
            context_turns: 10,
        }
    }

    /// Whether voice input can be transcribed
    #[must_use]
    pub fn voice_available(&self) -> bool {
        self.transcriber.is_some()
    }
}

/// Forwards every transition to the client as `state_change`
struct BroadcastListener {
    outgoing: mpsc::Sender<ServerMessage>,
}

#[async_trait]
impl StateListener for BroadcastListener {
    async fn on_state_change(&self, change: &StateChange) -> Result<()> {
        self.outgoing
            .send(ServerMessage::from(change))
            .await
            .map_err(|_| Error::Session("outgoing channel closed".to_string()))
    }
}

/// Per-connection session driver
pub struct SessionOrchestrator {
    services: SessionServices,
    session_id: String,
    machine: TurnStateMachine,
    outgoing: mpsc::Sender<ServerMessage>,
    events: EventSender,
    listener: ListenerId,
    context: ConversationContext,
    engine: Option<WakeWordEngine>,
    segmenter: SpeechSegmenter,
    /// Push-to-talk buffer between `voice_start` and `voice_stop`
    capture: Option<Vec<f32>>,
}

impl SessionOrchestrator {
    /// Register the session and announce it to the client
    ///
    /// The returned receiver carries events from this session's foreign
    /// threads and must be drained into [`Self::handle_voice_event`].
    pub async fn open(
        services: SessionServices,
        session_id: impl Into<String>,
        outgoing: mpsc::Sender<ServerMessage>,
    ) -> (Self, EventReceiver) {
        let session_id = session_id.into();
        let machine = services.sessions.acquire(&session_id).await;
        let listener = machine.add_listener(Arc::new(BroadcastListener {
            outgoing: outgoing.clone(),
        }));
        let (events, receiver) = bridge::channel();
        let context = ConversationContext::new(session_id.clone(), services.context_turns);

        let orchestrator = Self {
            services,
            session_id,
            machine,
            outgoing,
            events,
            listener,
            context,
            engine: None,
            segmenter: SpeechSegmenter::default(),
            capture: None,
        };

        orchestrator
            .send(ServerMessage::Connected {
                session_id: orchestrator.session_id.clone(),
            })
            .await;
        tracing::info!(session_id = %orchestrator.session_id, "session opened");

        (orchestrator, receiver)
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub const fn machine(&self) -> &TurnStateMachine {
        &self.machine
    }

    /// Whether a push-to-talk capture is open
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    #[must_use]
    pub fn wake_word_active(&self) -> bool {
        self.engine.as_ref().is_some_and(WakeWordEngine::is_running)
    }

    /// Handle one client message
    ///
    /// Failures are reported to the client; the channel stays open.
    pub async fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::VadDetected => self.on_voice_activity().await,
            ClientMessage::AudioStream { audio } => self.on_audio(&audio).await,
            ClientMessage::Message { text } => self.on_text(&text).await,
            ClientMessage::TtsEnded => self.machine.handle_tts_end().await,
            ClientMessage::Interrupt => {
                self.machine.force_interrupt().await;
                self.send(ServerMessage::Interrupted {
                    state: self.machine.get_state(),
                })
                .await;
            }
            ClientMessage::WakeWordEnable { sensitivity } => self.enable_wake_word(sensitivity).await,
            ClientMessage::WakeWordDisable => {
                if let Some(mut engine) = self.engine.take() {
                    engine.stop();
                }
                self.send(ServerMessage::WakeWordStatus {
                    enabled: false,
                    sensitivity: None,
                    error: None,
                })
                .await;
            }
            ClientMessage::GetState => {
                let state = self.machine.get_state();
                self.send(ServerMessage::StateInfo {
                    state,
                    is_speaking: state.is_speaking(),
                    is_listening: state.is_listening(),
                    wakeword_active: self.wake_word_active(),
                })
                .await;
            }
            ClientMessage::VoiceStart => {
                self.capture = Some(Vec::new());
                self.machine.handle_speech_start().await;
                self.send(ServerMessage::ListeningStarted).await;
            }
            ClientMessage::VoiceStop => self.on_voice_stop().await,
            ClientMessage::Ping => self.send(ServerMessage::Pong).await,
        }
    }

    /// Handle an event raised on one of this session's foreign threads
    pub async fn handle_voice_event(&mut self, event: VoiceEvent) {
        match event {
            VoiceEvent::WakeWord { phrase, detected_at } => {
                let was_speaking = self.machine.is_speaking();
                if was_speaking {
                    self.send(ServerMessage::Interrupt {
                        reason: "wake_word_during_speech".to_string(),
                    })
                    .await;
                }
                tracing::info!(session_id = %self.session_id, phrase = %phrase, "wake word");
                self.segmenter.reset();
                self.machine.handle_wakeword().await;
                self.send(ServerMessage::WakeWordDetected {
                    timestamp: detected_at,
                })
                .await;
            }
            VoiceEvent::EngineStopped { error } => {
                self.engine = None;
                tracing::warn!(session_id = %self.session_id, error = ?error, "wake word engine stopped");
                self.send(ServerMessage::WakeWordStatus {
                    enabled: false,
                    sensitivity: None,
                    error,
                })
                .await;
            }
        }
    }

    /// Remove this session's listener and engine, releasing its machine
    pub async fn close(mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
        }
        self.machine.remove_listener(self.listener);
        self.services.sessions.release(&self.session_id).await;
        tracing::info!(session_id = %self.session_id, "session closed");
    }

    async fn on_voice_activity(&mut self) {
        let was_speaking = self.machine.is_speaking();
        if was_speaking {
            self.send(ServerMessage::Interrupt {
                reason: "user_speaking".to_string(),
            })
            .await;
        }
        self.machine.handle_speech_start().await;
    }

    async fn on_audio(&mut self, audio: &str) {
        let samples = match decode_pcm16_base64(audio) {
            Ok(samples) => samples,
            Err(e) => {
                self.send(ServerMessage::error("invalid_audio", e.to_string())).await;
                return;
            }
        };

        let voice_activity = self.segmenter.is_voiced(&samples);
        if let Some(engine) = &self.engine {
            engine.feed(samples.clone());
        }

        let mut utterance = None;
        let mut capture_full = false;
        if let Some(capture) = &mut self.capture {
            let room = MAX_SEGMENT_SAMPLES.saturating_sub(capture.len());
            capture.extend_from_slice(&samples[..samples.len().min(room)]);
            capture_full = capture.len() >= MAX_SEGMENT_SAMPLES;
        } else if self.machine.get_state() == TurnState::Listening {
            utterance = self.segmenter.push(&samples);
        } else {
            self.segmenter.reset();
        }

        let mut transcription = String::new();
        let mut wake_word_detected = false;
        if let Some(segment) = utterance {
            match self.transcribe(&segment).await {
                Ok(text) => {
                    wake_word_detected = self.services.wake_words.matches(&text);
                    transcription = self.services.wake_words.extract_command(&text);
                }
                Err(e) => {
                    self.fail("transcription_failed", &e).await;
                    return;
                }
            }
        }

        self.send(ServerMessage::AudioProcessed {
            wake_word_detected,
            voice_activity,
            transcription: transcription.clone(),
            state: self.machine.get_state(),
        })
        .await;

        if capture_full {
            tracing::warn!(session_id = %self.session_id, samples = MAX_SEGMENT_SAMPLES, "capture reached length cap, stopping");
            self.on_voice_stop().await;
        } else if !transcription.is_empty() {
            self.machine.handle_speech_end().await;
            self.respond_turn(&transcription).await;
        }
    }

    async fn on_text(&mut self, text: &str) {
        match self.machine.get_state() {
            TurnState::Listening | TurnState::Thinking => {}
            TurnState::Speaking => self.machine.force_interrupt().await,
            _ => {
                self.machine
                    .transition(TurnState::Listening, "text message received")
                    .await;
            }
        }
        self.respond_turn(text).await;
    }

    async fn on_voice_stop(&mut self) {
        let samples = self.capture.take().unwrap_or_default();
        let text = if samples.is_empty() {
            String::new()
        } else {
            match self.transcribe(&samples).await {
                Ok(text) => text,
                Err(e) => {
                    self.fail("transcription_failed", &e).await;
                    return;
                }
            }
        };

        self.machine.handle_speech_end().await;
        self.send(ServerMessage::Transcription { text }).await;
    }

    async fn enable_wake_word(&mut self, sensitivity: f32) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
        }

        let Some(factory) = &self.services.spotter else {
            self.send(ServerMessage::WakeWordStatus {
                enabled: false,
                sensitivity: None,
                error: Some("Wake word detection not available".to_string()),
            })
            .await;
            return;
        };

        match WakeWordEngine::start(factory(), sensitivity, self.events.clone()) {
            Ok(engine) => {
                let sensitivity = engine.sensitivity();
                self.segmenter = SpeechSegmenter::new(sensitivity);
                self.engine = Some(engine);
                self.send(ServerMessage::WakeWordStatus {
                    enabled: true,
                    sensitivity: Some(sensitivity),
                    error: None,
                })
                .await;
            }
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "failed to start wake word engine");
                self.send(ServerMessage::WakeWordStatus {
                    enabled: false,
                    sensitivity: None,
                    error: Some(e.to_string()),
                })
                .await;
            }
        }
    }

    /// Generate, act on and speak a reply to `text`
    pub async fn respond_turn(&mut self, text: &str) {
        self.machine.handle_llm_start().await;
        self.context.available_tools = self.services.dispatcher.registry().names();

        let reply = match self.services.responder.respond(text, &self.context).await {
            Ok(reply) => reply,
            Err(e) => {
                self.fail("response_failed", &e).await;
                return;
            }
        };

        let (spoken, actions) =
            resolve_inline_tools(&self.services.dispatcher, &reply, &self.session_id).await;
        self.context.push(text, spoken.as_str());

        self.machine.handle_tts_start().await;
        let audio = self.speak(&spoken).await;
        let has_audio = audio.is_some();

        self.send(ServerMessage::Response {
            text: spoken,
            audio,
            actions,
            state: self.machine.get_state(),
        })
        .await;

        if !has_audio {
            self.machine.handle_tts_end().await;
        }
    }

    async fn speak(&self, text: &str) -> Option<String> {
        let synthesizer = self.services.synthesizer.as_ref()?;
        match synthesizer.synthesize(text).await {
            Ok(audio) => Some(STANDARD.encode(audio)),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "synthesis failed, replying with text only");
                None
            }
        }
    }

    async fn transcribe(&self, samples: &[f32]) -> Result<String> {
        let transcriber = self
            .services
            .transcriber
            .as_ref()
            .ok_or_else(|| Error::Stt("no transcriber configured".to_string()))?;
        let wav = samples_to_wav(samples, SAMPLE_RATE)?;
        transcriber.transcribe(&wav).await
    }

    async fn fail(&self, code: &str, error: &Error) {
        tracing::error!(session_id = %self.session_id, code, error = %error, "turn failed");
        self.machine.handle_error(&error.to_string()).await;
        self.send(ServerMessage::error(code, error.to_string())).await;
    }

    async fn send(&self, message: ServerMessage) {
        if self.outgoing.send(message).await.is_err() {
            tracing::debug!(session_id = %self.session_id, "client gone, dropping message");
        }
    }
}

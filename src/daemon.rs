//! Daemon - the main gateway service
//!
//! Wires the action registry, plugins, voice providers and responder into
//! shared session services, then serves the API until interrupted.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::actions::{ActionDispatcher, ActionRegistry, JobTracker};
use crate::agent::{ChatResponder, OfflineResponder, Responder};
use crate::api::ApiServerBuilder;
use crate::config::{SttProvider, TtsProvider};
use crate::conversation::SessionRegistry;
use crate::plugins::{PluginManager, register_plugin_tools};
use crate::session::{SessionServices, SpotterFactory};
use crate::tools::register_builtin_tools;
use crate::voice::{
    SpeechToText, Synthesizer, TextToSpeech, Transcriber, TranscriptSpotter, WakeWordSpotter,
    WakeWords,
};
use crate::{Config, Error, Result};

/// The Cadence daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Build the action registry with built-in and plugin tools
    #[must_use]
    pub fn build_registry(config: &Config) -> (Arc<ActionRegistry>, PluginManager) {
        let registry = ActionRegistry::new();
        register_builtin_tools(&registry);

        let mut plugins = PluginManager::new();
        plugins.load_all(&config.plugin_dirs);
        let count = register_plugin_tools(&plugins, &registry);
        tracing::info!(
            plugins = plugins.len(),
            plugin_tools = count,
            tools = registry.len(),
            "action registry ready"
        );

        (Arc::new(registry), plugins)
    }

    /// Speech-to-text client, if voice is enabled and credentials exist
    fn init_transcriber(&self) -> Option<Arc<dyn Transcriber>> {
        let voice = &self.config.voice;
        if !voice.enabled {
            return None;
        }

        let keys = &self.config.api_keys;
        let model = voice.stt_model.clone();
        let built = match voice.stt_provider {
            SttProvider::Whisper => keys
                .openai
                .clone()
                .map(|key| SpeechToText::whisper(key, model)),
            SttProvider::Deepgram => keys
                .deepgram
                .clone()
                .map(|key| SpeechToText::deepgram(key, model)),
        };

        match built {
            Some(Ok(stt)) => {
                tracing::info!(provider = ?voice.stt_provider, "speech-to-text ready");
                Some(Arc::new(stt))
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "speech-to-text unavailable");
                None
            }
            None => {
                tracing::info!(provider = ?voice.stt_provider, "no STT API key - voice input unavailable");
                None
            }
        }
    }

    /// Text-to-speech client, if voice is enabled and credentials exist
    fn init_synthesizer(&self) -> Option<Arc<dyn Synthesizer>> {
        let voice = &self.config.voice;
        if !voice.enabled {
            return None;
        }

        let keys = &self.config.api_keys;
        let built = match voice.tts_provider {
            TtsProvider::OpenAI => keys.openai.clone().map(|key| {
                TextToSpeech::openai(
                    key,
                    voice.tts_model.clone(),
                    voice.tts_voice.clone(),
                    voice.tts_speed,
                )
            }),
            TtsProvider::ElevenLabs => keys.elevenlabs.clone().map(|key| {
                TextToSpeech::elevenlabs(key, voice.tts_model.clone(), voice.tts_voice.clone())
            }),
        };

        match built {
            Some(Ok(tts)) => {
                tracing::info!(provider = ?voice.tts_provider, "text-to-speech ready");
                Some(Arc::new(tts))
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "text-to-speech unavailable");
                None
            }
            None => {
                tracing::info!(provider = ?voice.tts_provider, "no TTS API key - replies are text only");
                None
            }
        }
    }

    fn init_responder(&self) -> Arc<dyn Responder> {
        let llm = &self.config.llm;
        let key = self.config.api_keys.openai.clone();
        let local = !llm.base_url.contains("api.openai.com");

        if key.is_none() && !local {
            tracing::warn!("no LLM API key configured - using offline responder");
            return Arc::new(OfflineResponder);
        }

        tracing::info!(url = %llm.base_url, model = %llm.model, "chat responder initialized");
        Arc::new(ChatResponder::new(
            llm.base_url.clone(),
            key,
            llm.model.clone(),
            llm.system_prompt.clone(),
        ))
    }

    /// Assemble the collaborators shared by every session
    #[must_use]
    pub fn build_services(&self, registry: Arc<ActionRegistry>) -> SessionServices {
        let jobs = Arc::new(JobTracker::new(self.config.jobs));
        let dispatcher = ActionDispatcher::new(registry, jobs);
        let sessions = Arc::new(SessionRegistry::new(self.config.turn));

        let mut services = SessionServices::new(sessions, dispatcher, self.init_responder());
        services.wake_words = WakeWords::new(&self.config.voice.wake_words);
        services.context_turns = self.config.llm.context_turns;
        services.transcriber = self.init_transcriber();
        services.synthesizer = self.init_synthesizer();
        services.spotter = services
            .transcriber
            .clone()
            .map(|stt| spotter_factory(Handle::current(), stt, services.wake_words.clone()));

        services
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the API server fails
    pub async fn run(self) -> Result<()> {
        let (registry, plugins) = Self::build_registry(&self.config);
        let services = self.build_services(registry);
        let voice_available = services.voice_available();

        let server = ApiServerBuilder::new(services)
            .plugins(Arc::new(plugins))
            .api_key(self.config.server.api_key.clone())
            .developer_mode(self.config.server.developer_mode)
            .port(self.config.server.port)
            .build();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        let mut api_handle = server.spawn();
        tracing::info!(
            port = self.config.server.port,
            voice = voice_available,
            "daemon running"
        );

        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("shutdown requested");
                api_handle.abort();
            }
            result = &mut api_handle => {
                match result {
                    Ok(inner) => inner?,
                    Err(e) => return Err(Error::Config(format!("API server task failed: {e}"))),
                }
            }
        }

        tracing::info!("daemon stopped");
        Ok(())
    }
}

/// Wake word spotters that transcribe each segment and match the text
fn spotter_factory(
    runtime: Handle,
    transcriber: Arc<dyn Transcriber>,
    wake_words: WakeWords,
) -> SpotterFactory {
    Arc::new(move || -> Box<dyn WakeWordSpotter> {
        Box::new(TranscriptSpotter::new(
            runtime.clone(),
            Arc::clone(&transcriber),
            wake_words.clone(),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::CadenceConfigFile;

    fn config() -> Config {
        let mut fc = CadenceConfigFile::default();
        fc.plugins.dirs = Some(Vec::new());
        Config::from_sources(fc, |_| None, false).unwrap()
    }

    #[test]
    fn registry_has_builtins() {
        let (registry, plugins) = Daemon::build_registry(&config());
        assert!(registry.contains("echo"));
        assert!(registry.contains("time.now"));
        assert!(plugins.is_empty());
    }

    #[tokio::test]
    async fn services_without_keys_are_text_only() {
        let config = config();
        let (registry, _) = Daemon::build_registry(&config);
        let services = Daemon::new(config).build_services(registry);

        assert!(!services.voice_available());
        assert!(services.synthesizer.is_none());
        assert!(services.spotter.is_none());
        assert_eq!(services.context_turns, 10);
    }
}

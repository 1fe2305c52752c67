//! Configuration management for the Cadence gateway
//!
//! Values resolve as env > TOML file > defaults.

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::actions::JobLimits;
use crate::agent::DEFAULT_SYSTEM_PROMPT;
use crate::conversation::TurnTimings;
use crate::plugins::default_plugin_dirs;
use crate::{Error, Result};

use self::file::CadenceConfigFile;

/// Cadence gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub turn: TurnTimings,
    pub jobs: JobLimits,
    pub voice: VoiceConfig,
    pub llm: LlmConfig,
    pub api_keys: ApiKeys,
    /// Directories scanned for plugin manifests
    pub plugin_dirs: Vec<PathBuf>,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Bearer token for protected endpoints (from `CADENCE_API_KEY` env)
    pub api_key: Option<String>,
    pub developer_mode: bool,
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    Whisper,
    Deepgram,
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Text-to-speech backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAI,
    ElevenLabs,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub stt_provider: SttProvider,
    pub stt_model: String,
    pub tts_provider: TtsProvider,
    pub tts_model: String,
    pub tts_voice: String,
    pub tts_speed: f32,
    pub wake_words: Vec<String>,
}

/// Chat completion backend
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub context_turns: usize,
}

/// API keys for external services
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("openai", &self.openai.is_some())
            .field("deepgram", &self.deepgram.is_some())
            .field("elevenlabs", &self.elevenlabs.is_some())
            .finish()
    }
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or value is invalid
    pub fn load() -> Result<Self> {
        Self::load_with_options(false)
    }

    /// Load configuration, optionally forcing voice off
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or value is invalid
    pub fn load_with_options(disable_voice: bool) -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok(), disable_voice)
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or value is invalid
    pub fn from_sources<E>(fc: CadenceConfigFile, env: E, disable_voice: bool) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let server = ServerConfig {
            port: env("CADENCE_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(8000),
            api_key: env("CADENCE_API_KEY")
                .or(fc.server.api_key)
                .filter(|k| !k.trim().is_empty()),
            developer_mode: env("CADENCE_DEVELOPER_MODE")
                .map(|v| parse_flag(&v))
                .or(fc.server.developer_mode)
                .unwrap_or(false),
        };

        let defaults = TurnTimings::default();
        let turn = TurnTimings {
            wake_cleanup: fc
                .turn
                .wake_cleanup_ms
                .map_or(defaults.wake_cleanup, Duration::from_millis),
            interrupt: fc
                .turn
                .interrupt_ms
                .map_or(defaults.interrupt, Duration::from_millis),
            idle_grace: fc
                .turn
                .idle_grace_secs
                .map_or(defaults.idle_grace, Duration::from_secs),
            recovery: fc
                .turn
                .recovery_secs
                .map_or(defaults.recovery, Duration::from_secs),
            listener_timeout: fc
                .turn
                .listener_timeout_ms
                .map_or(defaults.listener_timeout, Duration::from_millis),
        };

        let job_defaults = JobLimits::default();
        let jobs = JobLimits {
            max_concurrent: fc.jobs.max_concurrent.unwrap_or(job_defaults.max_concurrent),
            retention: fc
                .jobs
                .retention_secs
                .map_or(job_defaults.retention, Duration::from_secs),
            max_records: fc.jobs.max_records.unwrap_or(job_defaults.max_records),
        };
        if jobs.max_concurrent == 0 {
            return Err(Error::Config("jobs.max_concurrent must be at least 1".to_string()));
        }

        let voice_enabled = !disable_voice && fc.voice.enabled.unwrap_or(true);
        if disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
        }
        let voice = VoiceConfig {
            enabled: voice_enabled,
            stt_provider: fc
                .voice
                .stt_provider
                .as_deref()
                .map_or(Ok(SttProvider::Whisper), |s| s.parse::<SttProvider>())?,
            stt_model: fc.voice.stt_model.unwrap_or_else(|| "whisper-1".to_string()),
            tts_provider: fc
                .voice
                .tts_provider
                .as_deref()
                .map_or(Ok(TtsProvider::OpenAI), |s| s.parse::<TtsProvider>())?,
            tts_model: fc.voice.tts_model.unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: fc.voice.tts_voice.unwrap_or_else(|| "alloy".to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0),
            wake_words: fc
                .voice
                .wake_words
                .filter(|w| !w.is_empty())
                .unwrap_or_else(|| vec!["hey cadence".to_string()]),
        };
        if !(0.25..=4.0).contains(&voice.tts_speed) {
            return Err(Error::Config(format!(
                "voice.tts_speed must be between 0.25 and 4.0, got {}",
                voice.tts_speed
            )));
        }

        let llm = LlmConfig {
            base_url: env("CADENCE_LLM_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: env("CADENCE_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            system_prompt: fc
                .llm
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            context_turns: fc.llm.context_turns.unwrap_or(10),
        };

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
        };

        let plugin_dirs = fc.plugins.dirs.unwrap_or_else(default_plugin_dirs);

        Ok(Self {
            server,
            turn,
            jobs,
            voice,
            llm,
            api_keys,
            plugin_dirs,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_sources() {
        let config = Config::from_sources(CadenceConfigFile::default(), env_from(&[]), false).unwrap();

        assert_eq!(config.server.port, 8000);
        assert!(config.server.api_key.is_none());
        assert!(!config.server.developer_mode);
        assert_eq!(config.turn, TurnTimings::default());
        assert_eq!(config.jobs, JobLimits::default());
        assert!(config.voice.enabled);
        assert_eq!(config.voice.stt_provider, SttProvider::Whisper);
        assert_eq!(config.voice.tts_provider, TtsProvider::OpenAI);
        assert_eq!(config.voice.wake_words, vec!["hey cadence"]);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.context_turns, 10);
    }

    #[test]
    fn env_overrides_file() {
        let mut fc = CadenceConfigFile::default();
        fc.server.port = Some(9000);
        fc.llm.model = Some("file-model".to_string());

        let env = env_from(&[
            ("CADENCE_PORT", "9100"),
            ("CADENCE_LLM_MODEL", "env-model"),
            ("CADENCE_DEVELOPER_MODE", "true"),
        ]);
        let config = Config::from_sources(fc, env, false).unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.llm.model, "env-model");
        assert!(config.server.developer_mode);
    }

    #[test]
    fn unparseable_env_port_falls_back_to_file() {
        let mut fc = CadenceConfigFile::default();
        fc.server.port = Some(9000);
        let config = Config::from_sources(fc, env_from(&[("CADENCE_PORT", "abc")]), false).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn file_values_convert_to_durations() {
        let mut fc = CadenceConfigFile::default();
        fc.turn.interrupt_ms = Some(10);
        fc.turn.idle_grace_secs = Some(3);
        fc.jobs.retention_secs = Some(60);

        let config = Config::from_sources(fc, env_from(&[]), false).unwrap();
        assert_eq!(config.turn.interrupt, Duration::from_millis(10));
        assert_eq!(config.turn.idle_grace, Duration::from_secs(3));
        assert_eq!(config.jobs.retention, Duration::from_secs(60));
    }

    #[test]
    fn disable_voice_wins() {
        let mut fc = CadenceConfigFile::default();
        fc.voice.enabled = Some(true);
        let config = Config::from_sources(fc, env_from(&[]), true).unwrap();
        assert!(!config.voice.enabled);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut fc = CadenceConfigFile::default();
        fc.voice.stt_provider = Some("carrier-pigeon".to_string());
        assert!(Config::from_sources(fc, env_from(&[]), false).is_err());

        let mut fc = CadenceConfigFile::default();
        fc.jobs.max_concurrent = Some(0);
        assert!(Config::from_sources(fc, env_from(&[]), false).is_err());

        let mut fc = CadenceConfigFile::default();
        fc.voice.tts_speed = Some(9.0);
        assert!(Config::from_sources(fc, env_from(&[]), false).is_err());
    }

    #[test]
    fn blank_api_key_means_unauthenticated() {
        let config =
            Config::from_sources(CadenceConfigFile::default(), env_from(&[("CADENCE_API_KEY", " ")]), false)
                .unwrap();
        assert!(config.server.api_key.is_none());
    }

    #[test]
    fn api_keys_debug_hides_values() {
        let keys = ApiKeys {
            openai: Some("sk-secret".to_string()),
            ..ApiKeys::default()
        };
        assert!(!format!("{keys:?}").contains("sk-secret"));
    }
}

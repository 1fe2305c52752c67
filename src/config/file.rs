//! TOML configuration file loading
//!
//! Supports `<config_dir>/cadence/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CadenceConfigFile {
    pub server: ServerFileConfig,
    pub turn: TurnFileConfig,
    pub jobs: JobsFileConfig,
    pub voice: VoiceFileConfig,
    pub llm: LlmFileConfig,
    pub api_keys: ApiKeysFileConfig,
    pub plugins: PluginsFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
    pub api_key: Option<String>,
    /// Allow runtime tool registration
    pub developer_mode: Option<bool>,
}

/// Turn-taking delays
#[derive(Debug, Default, Deserialize)]
pub struct TurnFileConfig {
    pub wake_cleanup_ms: Option<u64>,
    pub interrupt_ms: Option<u64>,
    pub idle_grace_secs: Option<u64>,
    pub recovery_secs: Option<u64>,
    pub listener_timeout_ms: Option<u64>,
}

/// Background job bounds
#[derive(Debug, Default, Deserialize)]
pub struct JobsFileConfig {
    pub max_concurrent: Option<usize>,
    pub retention_secs: Option<u64>,
    pub max_records: Option<usize>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable voice input/output
    pub enabled: Option<bool>,
    /// "whisper" or "deepgram"
    pub stt_provider: Option<String>,
    pub stt_model: Option<String>,
    /// "openai" or "elevenlabs"
    pub tts_provider: Option<String>,
    pub tts_model: Option<String>,
    /// Voice name, or voice id for ElevenLabs
    pub tts_voice: Option<String>,
    pub tts_speed: Option<f32>,
    pub wake_words: Option<Vec<String>>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// OpenAI-compatible API base (e.g. "https://api.openai.com/v1")
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    /// Exchanges kept per session
    pub context_turns: Option<usize>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Plugin discovery configuration
#[derive(Debug, Default, Deserialize)]
pub struct PluginsFileConfig {
    pub dirs: Option<Vec<PathBuf>>,
}

/// Load the TOML config file from the standard path
///
/// Returns `CadenceConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> CadenceConfigFile {
    config_file_path().map_or_else(CadenceConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_file_from(path: &Path) -> CadenceConfigFile {
    if !path.exists() {
        return CadenceConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                CadenceConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            CadenceConfigFile::default()
        }
    }
}

/// Return the config file path: `<config_dir>/cadence/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("cadence").join("config.toml"))
}

//! Text-to-speech over hosted APIs

use async_trait::async_trait;
use serde::Serialize;

use super::Synthesizer;
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TtsProvider {
    OpenAI,
    ElevenLabs,
}

impl TtsProvider {
    const fn label(self) -> &'static str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::ElevenLabs => "ElevenLabs",
        }
    }
}

#[derive(Serialize)]
struct OpenAiSpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

#[derive(Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// `OpenAI` or ElevenLabs speech synthesis client; output is MP3
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    /// Voice name (`OpenAI`) or voice id (ElevenLabs)
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
}

impl std::fmt::Debug for TextToSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextToSpeech")
            .field("provider", &self.provider)
            .field("voice", &self.voice)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl TextToSpeech {
    /// `OpenAI` speech endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn openai(api_key: String, model: String, voice: String, speed: f32) -> Result<Self> {
        Self::build(TtsProvider::OpenAI, api_key, model, voice, speed)
    }

    /// ElevenLabs text-to-speech; speed is not supported there
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn elevenlabs(api_key: String, model: String, voice_id: String) -> Result<Self> {
        Self::build(TtsProvider::ElevenLabs, api_key, model, voice_id, 1.0)
    }

    fn build(
        provider: TtsProvider,
        api_key: String,
        model: String,
        voice: String,
        speed: f32,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config(format!(
                "{} API key required for TTS",
                provider.label()
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
            provider,
        })
    }

    async fn synthesize_openai(&self, text: &str) -> Result<reqwest::Response> {
        let request = OpenAiSpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        Ok(self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?)
    }

    async fn synthesize_elevenlabs(&self, text: &str) -> Result<reqwest::Response> {
        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        Ok(self
            .client
            .post(format!(
                "https://api.elevenlabs.io/v1/text-to-speech/{}",
                self.voice
            ))
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?)
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(provider = ?self.provider, chars = text.len(), "starting synthesis");

        let response = match self.provider {
            TtsProvider::OpenAI => self.synthesize_openai(text).await?,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(provider = ?self.provider, status = %status, body = %body, "TTS API error");
            return Err(Error::Tts(format!(
                "{} TTS error {status}: {body}",
                self.provider.label()
            )));
        }

        let audio = response.bytes().await?;
        tracing::debug!(audio_bytes = audio.len(), "synthesis complete");
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_keys_are_rejected() {
        let err = TextToSpeech::openai(String::new(), "tts-1".into(), "alloy".into(), 1.0)
            .unwrap_err();
        assert!(err.to_string().contains("OpenAI API key required"));
        assert!(TextToSpeech::elevenlabs(" ".into(), "m".into(), "v".into()).is_err());
    }

    #[test]
    fn debug_output_hides_key() {
        let tts = TextToSpeech::openai("sk-secret".into(), "tts-1".into(), "alloy".into(), 1.0)
            .unwrap();
        assert!(!format!("{tts:?}").contains("sk-secret"));
    }
}

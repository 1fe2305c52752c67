//! Speech-to-text over hosted APIs

use async_trait::async_trait;

use super::Transcriber;
use crate::{Error, Result};

#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SttProvider {
    Whisper,
    Deepgram,
}

impl SttProvider {
    const fn label(self) -> &'static str {
        match self {
            Self::Whisper => "OpenAI",
            Self::Deepgram => "Deepgram",
        }
    }
}

/// Whisper or Deepgram transcription client
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: SttProvider,
}

impl std::fmt::Debug for SpeechToText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechToText")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl SpeechToText {
    /// `OpenAI` Whisper transcription
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn whisper(api_key: String, model: String) -> Result<Self> {
        Self::build(SttProvider::Whisper, api_key, model)
    }

    /// Deepgram pre-recorded transcription
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn deepgram(api_key: String, model: String) -> Result<Self> {
        Self::build(SttProvider::Deepgram, api_key, model)
    }

    fn build(provider: SttProvider, api_key: String, model: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config(format!(
                "{} API key required for transcription",
                provider.label()
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider,
        })
    }

    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<String> {
        let file = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Stt(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let result: WhisperResponse = self.check(response).await?.json().await?;
        Ok(result.text)
    }

    async fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String> {
        let response = self
            .client
            .post("https://api.deepgram.com/v1/listen")
            .query(&[("model", self.model.as_str()), ("punctuate", "true")])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await?;

        let result: DeepgramResponse = self.check(response).await?.json().await?;
        Ok(first_transcript(result))
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(provider = ?self.provider, status = %status, body = %body, "transcription API error");
        Err(Error::Stt(format!("{} API error {status}: {body}", self.provider.label())))
    }
}

fn first_transcript(response: DeepgramResponse) -> String {
    response
        .results
        .channels
        .into_iter()
        .next()
        .and_then(|c| c.alternatives.into_iter().next())
        .map(|a| a.transcript)
        .unwrap_or_default()
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(provider = ?self.provider, audio_bytes = audio.len(), "starting transcription");
        let transcript = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio).await,
            SttProvider::Deepgram => self.transcribe_deepgram(audio).await,
        }
        .inspect_err(|e| tracing::error!(provider = ?self.provider, error = %e, "transcription failed"))?;

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

//! Response generation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ConversationContext;
use crate::{Error, Result};

/// Prompt used when none is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Cadence, a voice assistant. Keep replies short \
and conversational, one or two sentences. When the user asks for an action, emit a tool \
command of the form [TOOL: name key=\"value\"] using one of the available tools, then \
confirm briefly.";

/// Spoken when no language model is configured
pub const OFFLINE_REPLY: &str =
    "Sorry, I can't answer right now because no language model is configured.";

/// Produces the assistant's reply to one user utterance
#[async_trait]
pub trait Responder: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the reply could not be generated
    async fn respond(&self, text: &str, context: &ConversationContext) -> Result<String>;
}

/// Fixed apology, used without LLM credentials
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineResponder;

#[async_trait]
impl Responder for OfflineResponder {
    async fn respond(&self, _text: &str, _context: &ConversationContext) -> Result<String> {
        Ok(OFFLINE_REPLY.to_string())
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct ChatMessage<'a> {
    role: &'static str,
    content: std::borrow::Cow<'a, str>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any `OpenAI`-compatible `/chat/completions` endpoint
pub struct ChatResponder {
    client: reqwest::Client,
    /// Base URL including the version segment, e.g. `https://api.openai.com/v1`
    base_url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
}

impl std::fmt::Debug for ChatResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatResponder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChatResponder {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            system_prompt: system_prompt.into(),
        }
    }

    fn build_messages<'a>(&'a self, text: &'a str, context: &'a ConversationContext) -> Vec<ChatMessage<'a>> {
        let system = if context.available_tools.is_empty() {
            std::borrow::Cow::Borrowed(self.system_prompt.as_str())
        } else {
            std::borrow::Cow::Owned(format!(
                "{}\n\nAvailable tools: {}",
                self.system_prompt,
                context.available_tools.join(", ")
            ))
        };

        let mut messages = vec![ChatMessage {
            role: "system",
            content: system,
        }];
        for exchange in context.history() {
            messages.push(ChatMessage {
                role: "user",
                content: exchange.user.as_str().into(),
            });
            messages.push(ChatMessage {
                role: "assistant",
                content: exchange.assistant.as_str().into(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: text.into(),
        });
        messages
    }
}

#[async_trait]
impl Responder for ChatResponder {
    async fn respond(&self, text: &str, context: &ConversationContext) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: self.build_messages(text, context),
            max_tokens: 256,
            temperature: 0.7,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!(model = %self.model, history = context.len(), "requesting completion");
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "completion API error");
            return Err(Error::Agent(format!("completion API error {status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await?;
        first_reply(parsed)
    }
}

fn first_reply(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::Agent("completion returned no content".to_string()))
}

//! Secondary generation provider (fallback tier 2).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use genflow_core::{GenerationParams, Platform};

use crate::http::{ExecutorError, RequestSpec, ResilientExecutor};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("provider transport failure: {0}")]
    Transport(#[from] ExecutorError),

    #[error("provider reply could not be decoded: {0}")]
    Decode(String),

    #[error("no generation provider configured")]
    NotConfigured,
}

/// Direct, synchronous generation with the same parameters the workflow gets.
///
/// Returns the raw reply; the caller normalizes it.
#[async_trait::async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, params: &GenerationParams) -> Result<Value, ProviderError>;
}

/// OpenAI-compatible chat-completions endpoint settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
}

impl ProviderConfig {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            api_key: None,
            model: Self::DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: Value,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
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
    content: Option<String>,
}

/// Chat-completions client going through the resilient executor.
#[derive(Debug, Clone)]
pub struct ChatCompletionsProvider {
    executor: ResilientExecutor,
    config: ProviderConfig,
}

impl ChatCompletionsProvider {
    pub fn new(executor: ResilientExecutor, config: ProviderConfig) -> Self {
        Self { executor, config }
    }

    fn request_body(&self, params: &GenerationParams) -> Value {
        let model = if self.config.model.is_empty() {
            ProviderConfig::DEFAULT_MODEL
        } else {
            &self.config.model
        };
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt(params.platform_kind()).to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(params),
                },
            ],
            response_format: json!({"type": "json_object"}),
        };
        serde_json::to_value(&request).unwrap_or(Value::Null)
    }
}

#[async_trait::async_trait]
impl GenerationProvider for ChatCompletionsProvider {
    async fn generate(&self, params: &GenerationParams) -> Result<Value, ProviderError> {
        let url = self.config.url.as_deref().ok_or(ProviderError::NotConfigured)?;

        let mut spec = RequestSpec::post_json(self.request_body(params));
        if let Some(key) = &self.config.api_key {
            spec = spec.with_bearer(key.clone());
        }

        let response = self.executor.execute(url, &spec).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))?;
        Ok(extract_reply(body))
    }
}

/// First choice's message content when the body is a chat completion,
/// otherwise the body itself.
fn extract_reply(body: Value) -> Value {
    match ChatResponse::deserialize(&body) {
        Ok(parsed) => parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(Value::String)
            .unwrap_or(body),
        Err(_) => body,
    }
}

fn system_prompt(platform: Platform) -> &'static str {
    match platform {
        Platform::TikTok | Platform::YouTube => {
            "You write short-form video scripts. Reply with JSON only: \
             {\"scenes\":[{\"script\":\"...\",\"visual\":\"...\"}],\
             \"hooks\":[],\"keywords\":[],\"hashtags\":[],\"score\":0-100}."
        }
        Platform::Instagram => {
            "You write carousel posts. Reply with JSON only: \
             {\"slides\":[{\"headline\":\"...\",\"body\":\"...\",\"visual\":\"...\"}],\
             \"hooks\":[],\"keywords\":[],\"hashtags\":[],\"score\":0-100}."
        }
        Platform::Twitter => {
            "You write threads. Reply with JSON only: \
             {\"thread\":[\"...\"],\"hooks\":[],\"keywords\":[],\"hashtags\":[],\"score\":0-100}."
        }
        Platform::LinkedIn | Platform::Other => {
            "You write social captions. Reply with JSON only: \
             {\"caption\":{\"hook\":\"...\",\"body\":\"...\",\"cta\":\"...\"},\
             \"hooks\":[],\"keywords\":[],\"hashtags\":[],\"score\":0-100}."
        }
    }
}

fn user_prompt(params: &GenerationParams) -> String {
    let mut prompt = format!(
        "Topic: {}\nPlatform: {}",
        params.topic.trim(),
        params.platform.trim()
    );
    if let Some(tone) = &params.tone {
        prompt.push_str(&format!("\nTone: {tone}"));
    }
    if let Some(audience) = &params.audience {
        prompt.push_str(&format!("\nAudience: {audience}"));
    }
    for (key, value) in &params.extra {
        match value {
            Value::String(s) => prompt.push_str(&format!("\n{key}: {s}")),
            other => prompt.push_str(&format!("\n{key}: {other}")),
        }
    }
    prompt
}

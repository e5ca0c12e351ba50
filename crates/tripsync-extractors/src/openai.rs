//! OpenAI chat-completions backend for the AI fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tripsync_storage::ApiClient;

use crate::ai::TextModel;
use crate::ExtractError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str =
    "You extract travel booking details from emails and answer with a single JSON object.";

#[derive(Debug, Clone)]
pub struct OpenAiTextModel {
    api: ApiClient,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiTextModel {
    pub fn new(api: ApiClient, api_key: impl Into<String>) -> Self {
        Self {
            api,
            api_key: api_key.into(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Custom endpoint (proxies, compatible servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

#[async_trait]
impl TextModel for OpenAiTextModel {
    async fn complete(&self, prompt: &str) -> Result<String, ExtractError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response: ChatResponse = self
            .api
            .post_json(&url, Some(self.api_key.as_str()), &self.request(prompt))
            .await
            .map_err(|e| ExtractError::Model(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ExtractError::Model("no choices in completion".into()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

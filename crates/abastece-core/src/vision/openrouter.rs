//! OpenRouter chat-completions client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{VisionClient, VisionRequest};
use crate::error::VisionError;
use crate::models::config::VisionConfig;

/// Blocking client for an OpenAI-compatible chat-completions endpoint.
pub struct OpenRouterClient {
    endpoint: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

impl OpenRouterClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, VisionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VisionError::Request(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            max_tokens: 1500,
            temperature: 0.1,
            timeout_secs,
            client,
        })
    }

    /// Build from configuration, reading the key from `api_key_env`.
    pub fn from_config(config: &VisionConfig) -> Result<Self, VisionError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| VisionError::MissingApiKey(config.api_key_env.clone()))?;

        Ok(Self::new(&config.base_url, api_key, config.timeout_secs)?
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature))
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: String },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn build_body<'a>(
    model: &'a str,
    request: &'a VisionRequest,
    max_tokens: u32,
    temperature: f32,
) -> ChatRequest<'a> {
    let labeled = request.images.len() > 1;
    let mut content = vec![ContentPart::Text {
        text: request.instruction.clone(),
    }];

    for image in &request.images {
        if labeled {
            content.push(ContentPart::Text {
                text: format!("Região: {}", image.label),
            });
        }
        content.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: &image.data_url,
            },
        });
    }

    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content,
        }],
        max_tokens,
        temperature,
    }
}

impl VisionClient for OpenRouterClient {
    fn complete(&self, model: &str, request: &VisionRequest) -> Result<String, VisionError> {
        let body = build_body(model, request, self.max_tokens, self.temperature);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "abastece")
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    VisionError::Request(format!("timed out after {}s", self.timeout_secs))
                } else {
                    VisionError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(VisionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| VisionError::MalformedJson(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(VisionError::NoChoices)?;

        debug!("{} answered {} chars", model, content.len());
        Ok(content)
    }
}

//! OpenAI-compatible chat completions client

use crate::client::{CompletionClient, CompletionError, CompletionRequest, Role};
use crate::{Error, Result};
use async_trait::async_trait;
use newsroll_core::{Config, OpenAiSettings};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-request HTTP timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for `POST {base_url}/chat/completions`
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, settings: &OpenAiSettings) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            url: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }

    /// Build a client from configuration; the API key may come from the environment
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            Error::Config(format!(
                "No API key configured. Set {} or openai.api_key.",
                newsroll_core::config::API_KEY_ENV
            ))
        })?;
        Self::new(api_key, &config.openai)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat<'a> {
    JsonSchema { json_schema: JsonSchemaFormat<'a> },
    JsonObject,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: Option<String>,
    refusal: Option<String>,
}

fn build_body<'a>(model: &'a str, temperature: f32, request: &'a CompletionRequest) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(WireMessage {
        role: Role::System,
        content: &request.instructions,
    });
    messages.extend(request.messages.iter().map(|m| WireMessage {
        role: m.role,
        content: &m.content,
    }));

    let response_format = match &request.schema {
        Some(schema) => ResponseFormat::JsonSchema {
            json_schema: JsonSchemaFormat {
                name: &schema.name,
                schema: &schema.schema,
                strict: schema.strict,
            },
        },
        None => ResponseFormat::JsonObject,
    };

    ChatRequest {
        model,
        messages,
        temperature,
        response_format,
    }
}

/// Map a non-success status to the completion error taxonomy
fn classify_status(status: u16, body: &str, schema_mode: bool) -> CompletionError {
    let detail = truncate_str(body, 300).to_string();
    match status {
        429 => CompletionError::RateLimited(detail),
        400 if schema_mode => CompletionError::SchemaRejected(detail),
        401 | 403 => CompletionError::Transport(format!("authentication failed ({}): {}", status, detail)),
        500..=599 => CompletionError::Transport(format!(
            "server error ({}), the service may be temporarily unavailable: {}",
            status, detail
        )),
        _ => CompletionError::Transport(format!("API error {}: {}", status, detail)),
    }
}

/// Truncate a string for display (Unicode-safe)
fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, CompletionError> {
        let schema_mode = request.schema.is_some();
        let body = build_body(&self.model, self.temperature, request);

        debug!(
            "Sending completion request: model={}, messages={}, schema_mode={}",
            self.model,
            body.messages.len(),
            schema_mode
        );

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        if !status.is_success() {
            let error = classify_status(status.as_u16(), &text, schema_mode);
            warn!("Completion request failed: {}", error);
            return Err(error);
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            CompletionError::Transport(format!(
                "unexpected response envelope: {} ({})",
                e,
                truncate_str(&text, 200)
            ))
        })?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| CompletionError::Transport("response contained no choices".to_string()))?;

        // A refusal is content, not transport: let the validator reject it
        Ok(message.content.or(message.refusal).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChatMessage, ResponseSchema};

    fn request(schema: Option<ResponseSchema>) -> CompletionRequest {
        CompletionRequest {
            instructions: "Group the articles.".to_string(),
            schema,
            messages: vec![ChatMessage::user("items"), ChatMessage::user("feedback")],
        }
    }

    #[test]
    fn test_body_in_schema_mode() {
        let req = request(Some(ResponseSchema::classification().unwrap()));
        let body = serde_json::to_value(build_body("gpt-4o", 0.1, &req)).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Group the articles.");
        assert_eq!(body["messages"][2]["content"], "feedback");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "classification");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(
            body["response_format"]["json_schema"]["schema"]["type"],
            "object"
        );
    }

    #[test]
    fn test_body_in_freeform_mode() {
        let req = request(None);
        let body = serde_json::to_value(build_body("gpt-4o", 0.1, &req)).unwrap();

        assert_eq!(body["response_format"], serde_json::json!({"type": "json_object"}));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            classify_status(429, "slow down", true),
            CompletionError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(400, "response_format json_schema unsupported", true),
            CompletionError::SchemaRejected(_)
        ));
        assert!(matches!(
            classify_status(400, "bad request", false),
            CompletionError::Transport(_)
        ));
        assert!(matches!(
            classify_status(401, "invalid key", true),
            CompletionError::Transport(_)
        ));
        assert!(matches!(
            classify_status(503, "", false),
            CompletionError::Transport(_)
        ));
    }

    #[test]
    fn test_truncate_str_is_char_safe() {
        assert_eq!(truncate_str("héllo", 2), "hé");
        assert_eq!(truncate_str("abc", 10), "abc");
    }

    #[test]
    fn test_from_config_requires_key() {
        let mut config = Config::default();
        config.openai.api_key = Some("sk-test".to_string());
        config.openai.base_url = "http://localhost:8080/v1/".to_string();

        let client = OpenAiClient::from_config(&config).unwrap();
        assert_eq!(client.url, "http://localhost:8080/v1/chat/completions");
        assert_eq!(client.model(), "gpt-4o");
    }
}

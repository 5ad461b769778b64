//! OpenAI adapter (Chat Completions API).
//!
//! Unlike the Messages API, the system prompt travels as a leading
//! `system` message and images as data-URL `image_url` content parts.

use std::path::Path;

use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};

use scribe_types::{ChatMessage, CompletionResponse, Role};

use crate::{error_body, http_client, image_media_type, ChatProvider, ProviderError};

/// Fallback completion provider, backed by the OpenAI Chat Completions API.
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    url: String,
}

impl OpenAiProvider {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o";

    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            url: crate::OPENAI_API_URL.to_string(),
        }
    }

    /// Point the adapter at a different API host (tests).
    #[must_use]
    pub fn with_base_url(mut self, base: &str) -> Self {
        self.url = format!("{}/v1/chat/completions", base.trim_end_matches('/'));
        self
    }

    async fn send(&self, body: Value) -> Result<ChatCompletionsResponse, ProviderError> {
        let response = http_client()
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        response
            .json::<ChatCompletionsResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    fn into_completion(&self, parsed: ChatCompletionsResponse, latency_ms: f64) -> CompletionResponse {
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let tokens_used = parsed.usage.map_or(0, |usage| usage.total_tokens);

        tracing::debug!(
            model = %self.model,
            tokens = tokens_used,
            latency_ms = latency_ms.round(),
            "openai completion"
        );

        CompletionResponse {
            content,
            model: self.model.clone(),
            tokens_used,
            latency_ms,
            provider: "openai".to_string(),
        }
    }
}

fn api_messages(messages: &[ChatMessage], system: Option<&str>) -> Vec<Value> {
    let mut api = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        api.push(json!({ "role": "system", "content": system }));
    }
    api.extend(
        messages
            .iter()
            .map(|msg| json!({ "role": msg.role.as_str(), "content": msg.content })),
    );
    api
}

#[async_trait::async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<CompletionResponse, ProviderError> {
        let start = std::time::Instant::now();

        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": api_messages(messages, system),
        });

        let parsed = self.send(body).await?;
        Ok(self.into_completion(parsed, start.elapsed().as_secs_f64() * 1000.0))
    }

    async fn complete_with_image(
        &self,
        messages: &[ChatMessage],
        image: &Path,
        system: Option<&str>,
        max_tokens: u32,
    ) -> Result<CompletionResponse, ProviderError> {
        let start = std::time::Instant::now();

        let bytes = tokio::fs::read(image).await?;
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        let data_url = format!("data:{};base64,{data}", image_media_type(image));

        let mut api = api_messages(messages, system);
        let last_user = messages.iter().rposition(|msg| msg.role == Role::User);
        // The system message, when present, shifts indices by one.
        let offset = usize::from(system.is_some());

        let image_part = json!({ "type": "image_url", "image_url": { "url": data_url } });
        match last_user {
            Some(index) => {
                let text = messages[index].content.trim();
                let text = if text.is_empty() {
                    "Describe this image."
                } else {
                    text
                };
                api[index + offset] = json!({
                    "role": "user",
                    "content": [{ "type": "text", "text": text }, image_part]
                });
            }
            None => {
                api.push(json!({
                    "role": "user",
                    "content": [{ "type": "text", "text": "Describe this image." }, image_part]
                }));
            }
        }

        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": api,
        });

        let parsed = self.send(body).await?;
        Ok(self.into_completion(parsed, start.elapsed().as_secs_f64() * 1000.0))
    }

    async fn close(&self) {}
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_response() -> serde_json::Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hello!" } }],
            "usage": { "prompt_tokens": 9, "completion_tokens": 6, "total_tokens": 15 }
        })
    }

    #[tokio::test]
    async fn complete_prepends_system_message_and_parses_usage() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-test",
                "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "hi" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("sk-test", "gpt-test").with_base_url(&server.uri());
        let reply = provider
            .complete(&[ChatMessage::user("hi")], Some("be brief"), 256, 0.7)
            .await
            .expect("completion");

        assert_eq!(reply.content, "Hello!");
        assert_eq!(reply.tokens_used, 15);
        assert_eq!(reply.provider, "openai");
    }

    #[tokio::test]
    async fn missing_usage_defaults_to_zero_tokens() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "ok" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("sk-test", "gpt-test").with_base_url(&server.uri());
        let reply = provider
            .complete(&[ChatMessage::user("hi")], None, 256, 0.7)
            .await
            .expect("completion");

        assert_eq!(reply.tokens_used, 0);
    }

    #[tokio::test]
    async fn api_error_carries_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("sk-test", "gpt-test").with_base_url(&server.uri());
        let err = provider
            .complete(&[ChatMessage::user("hi")], None, 256, 0.7)
            .await
            .expect_err("api error");

        match err {
            ProviderError::Api { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("rate limited"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}

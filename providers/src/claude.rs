//! Anthropic Claude adapter (Messages API).

use std::path::Path;

use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};

use scribe_types::{ChatMessage, CompletionResponse, Role};

use crate::{error_body, http_client, image_media_type, ChatProvider, ProviderError};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Primary completion provider, backed by the Anthropic Messages API.
pub struct ClaudeProvider {
    api_key: String,
    model: String,
    url: String,
}

impl ClaudeProvider {
    pub const DEFAULT_MODEL: &'static str = "claude-sonnet-4-20250514";

    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            url: crate::ANTHROPIC_API_URL.to_string(),
        }
    }

    /// Point the adapter at a different API host (tests).
    #[must_use]
    pub fn with_base_url(mut self, base: &str) -> Self {
        self.url = format!("{}/v1/messages", base.trim_end_matches('/'));
        self
    }

    async fn send(&self, body: Value) -> Result<MessagesResponse, ProviderError> {
        let response = http_client()
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
            .json::<MessagesResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    fn into_completion(&self, parsed: MessagesResponse, latency_ms: f64) -> CompletionResponse {
        let content = parsed
            .content
            .iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text.clone())
            .unwrap_or_default();
        let tokens_used = parsed.usage.input_tokens + parsed.usage.output_tokens;

        tracing::debug!(
            model = %self.model,
            tokens = tokens_used,
            latency_ms = latency_ms.round(),
            "claude completion"
        );

        CompletionResponse {
            content,
            model: self.model.clone(),
            tokens_used,
            latency_ms,
            provider: "claude".to_string(),
        }
    }
}

fn api_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| json!({ "role": msg.role.as_str(), "content": msg.content }))
        .collect()
}

/// Attach the image to the last user turn as a base64 content block.
///
/// When there is no user turn at all, a synthetic "describe this" turn
/// carries the image.
fn api_messages_with_image(messages: &[ChatMessage], media_type: &str, data: &str) -> Vec<Value> {
    let image_block = json!({
        "type": "image",
        "source": { "type": "base64", "media_type": media_type, "data": data }
    });

    let mut api: Vec<Value> = api_messages(messages);
    let last_user = messages.iter().rposition(|msg| msg.role == Role::User);

    match last_user {
        Some(index) => {
            let text = messages[index].content.trim();
            let text = if text.is_empty() {
                "Describe this image."
            } else {
                text
            };
            api[index] = json!({
                "role": "user",
                "content": [image_block, { "type": "text", "text": text }]
            });
        }
        None => {
            api.push(json!({
                "role": "user",
                "content": [image_block, { "type": "text", "text": "Describe this image." }]
            }));
        }
    }

    api
}

#[async_trait::async_trait]
impl ChatProvider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<CompletionResponse, ProviderError> {
        let start = std::time::Instant::now();

        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": api_messages(messages),
        });
        if let Some(system) = system {
            body["system"] = Value::String(system.to_string());
        }

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
        let media_type = image_media_type(image);

        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": api_messages_with_image(messages, media_type, &data),
        });
        if let Some(system) = system {
            body["system"] = Value::String(system.to_string());
        }

        let parsed = self.send(body).await?;
        Ok(self.into_completion(parsed, start.elapsed().as_secs_f64() * 1000.0))
    }

    async fn close(&self) {}
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn messages_response() -> serde_json::Value {
        json!({
            "content": [{ "type": "text", "text": "Привет!" }],
            "usage": { "input_tokens": 12, "output_tokens": 8 }
        })
    }

    #[tokio::test]
    async fn complete_sends_headers_and_parses_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({
                "model": "claude-test",
                "max_tokens": 256,
                "system": "be brief",
                "messages": [{ "role": "user", "content": "привет" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(messages_response()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ClaudeProvider::new("sk-test", "claude-test").with_base_url(&server.uri());
        let reply = provider
            .complete(
                &[ChatMessage::user("привет")],
                Some("be brief"),
                256,
                0.7,
            )
            .await
            .expect("completion");

        assert_eq!(reply.content, "Привет!");
        assert_eq!(reply.tokens_used, 20);
        assert_eq!(reply.provider, "claude");
        assert_eq!(reply.model, "claude-test");
    }

    #[tokio::test]
    async fn api_error_carries_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(529).set_body_string(r#"{"error":{"type":"overloaded"}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = ClaudeProvider::new("sk-test", "claude-test").with_base_url(&server.uri());
        let err = provider
            .complete(&[ChatMessage::user("hi")], None, 256, 0.7)
            .await
            .expect_err("api error");

        match err {
            ProviderError::Api { status, body } => {
                assert_eq!(status, 529);
                assert!(body.contains("overloaded"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn image_call_embeds_base64_block_in_last_user_turn() {
        let server = MockServer::start().await;

        let dir = tempfile::tempdir().expect("tempdir");
        let image_path = dir.path().join("shot.png");
        std::fs::write(&image_path, b"not-really-a-png").expect("write image");
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"not-really-a-png");

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({
                "messages": [{
                    "role": "user",
                    "content": [
                        {
                            "type": "image",
                            "source": { "type": "base64", "media_type": "image/png", "data": encoded }
                        },
                        { "type": "text", "text": "что на скриншоте?" }
                    ]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(messages_response()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ClaudeProvider::new("sk-test", "claude-test").with_base_url(&server.uri());
        provider
            .complete_with_image(
                &[ChatMessage::user("что на скриншоте?")],
                &image_path,
                None,
                256,
            )
            .await
            .expect("completion");
    }

    #[tokio::test]
    async fn missing_image_file_fails_before_any_request() {
        let server = MockServer::start().await;
        // No mock mounted: any request would 404 and fail the expect below.

        let provider = ClaudeProvider::new("sk-test", "claude-test").with_base_url(&server.uri());
        let err = provider
            .complete_with_image(
                &[ChatMessage::user("hi")],
                Path::new("/definitely/not/here.png"),
                None,
                256,
            )
            .await
            .expect_err("missing file");

        assert!(matches!(err, ProviderError::Image(_)));
    }
}

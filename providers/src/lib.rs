//! Completion provider clients with circuit-breaker failover.
//!
//! # Architecture
//!
//! - [`ChatProvider`] - the capability set every adapter implements
//! - [`claude`] - Anthropic Messages API client (primary)
//! - [`openai`] - OpenAI Chat Completions API client (fallback)
//! - [`CircuitBreaker`] - per-provider failure detection
//! - [`FailoverClient`] - ordered provider list, first healthy success wins
//!
//! Adapters are plain request/response clients: one HTTP call per
//! completion, no streaming, no retries. Resilience lives one level up, in
//! the breaker and the failover order.

mod breaker;
mod claude;
mod failover;
mod openai;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitError, CircuitState};
pub use claude::ClaudeProvider;
pub use failover::{CompletionError, FailoverClient};
pub use openai::OpenAiProvider;

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use scribe_types::{ChatMessage, CompletionResponse};

/// Canonical Anthropic Messages API endpoint.
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
/// Canonical OpenAI Chat Completions API endpoint.
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// One completion dependency (Claude, OpenAI, ...).
///
/// Adapters report failures through [`ProviderError`]; availability beyond
/// "the process can reach it" is the breaker's concern, so the default
/// `is_available` is unconditionally true.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Same protocol as `complete`, with an image attached to the last
    /// user turn.
    async fn complete_with_image(
        &self,
        messages: &[ChatMessage],
        image: &Path,
        system: Option<&str>,
        max_tokens: u32,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Release any held resources. Idempotent.
    async fn close(&self);

    fn is_available(&self) -> bool {
        true
    }
}

/// One adapter call failed.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("image read failed: {0}")]
    Image(#[from] std::io::Error),
    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Shared HTTP client for all adapters.
pub(crate) fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("failed to build configured HTTP client: {e}; using defaults");
                reqwest::Client::new()
            })
    })
}

/// Read a non-2xx response body for error reporting, bounded.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY_BYTES {
        let mut end = MAX_ERROR_BODY_BYTES;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body[..end].to_string()
    } else {
        body
    }
}

/// MIME type for an image attachment, by file extension.
pub(crate) fn image_media_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

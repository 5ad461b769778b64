//! Multi-provider completion client with automatic failover.
//!
//! Providers are registered in priority order (primary first). Every call
//! walks the same list from the top: entries whose breaker denies calls are
//! skipped without being invoked, the first success wins, and an exhausted
//! list fails with the last recorded provider error. There is no sticky
//! "current provider" - a recovered primary is used again on the very next
//! call.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use scribe_types::{ChatMessage, CompletionResponse};

use crate::breaker::{BreakerConfig, CircuitBreaker, CircuitError};
use crate::{ChatProvider, ProviderError};

/// Terminal failure of one completion request.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("all providers failed; last error: {}", last.as_ref().map_or_else(|| "none".to_string(), ToString::to_string))]
    AllProvidersFailed { last: Option<ProviderError> },
}

struct ProviderEntry {
    provider: Arc<dyn ChatProvider>,
    breaker: CircuitBreaker,
}

/// Ordered set of interchangeable completion providers.
pub struct FailoverClient {
    entries: Vec<ProviderEntry>,
}

impl FailoverClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a provider at the end of the priority list.
    ///
    /// Registration happens once at startup; the list is never reordered
    /// afterwards.
    pub fn register(&mut self, provider: Arc<dyn ChatProvider>, config: BreakerConfig) {
        let breaker = CircuitBreaker::new(provider.name().to_string(), config);
        tracing::info!(provider = provider.name(), "provider registered");
        self.entries.push(ProviderEntry { provider, breaker });
    }

    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.entries.len()
    }

    /// Generate a completion, failing over down the priority list.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<CompletionResponse, CompletionError> {
        let mut last_error: Option<ProviderError> = None;

        for entry in &self.entries {
            if !entry.breaker.is_available() {
                tracing::debug!(provider = entry.provider.name(), "provider skipped, circuit open");
                continue;
            }

            let outcome = entry
                .breaker
                .call(|| {
                    entry
                        .provider
                        .complete(messages, system, max_tokens, temperature)
                })
                .await;

            match outcome {
                Ok(response) => return Ok(response),
                Err(CircuitError::Open { .. }) => continue,
                Err(CircuitError::Operation(error)) => {
                    tracing::warn!(
                        provider = entry.provider.name(),
                        error = %error,
                        "provider failed"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(CompletionError::AllProvidersFailed { last: last_error })
    }

    /// Image-augmented variant of [`complete`](Self::complete), same
    /// failover protocol.
    pub async fn complete_with_image(
        &self,
        messages: &[ChatMessage],
        image: &Path,
        system: Option<&str>,
        max_tokens: u32,
    ) -> Result<CompletionResponse, CompletionError> {
        let mut last_error: Option<ProviderError> = None;

        for entry in &self.entries {
            if !entry.breaker.is_available() {
                tracing::debug!(provider = entry.provider.name(), "provider skipped, circuit open");
                continue;
            }

            let outcome = entry
                .breaker
                .call(|| {
                    entry
                        .provider
                        .complete_with_image(messages, image, system, max_tokens)
                })
                .await;

            match outcome {
                Ok(response) => return Ok(response),
                Err(CircuitError::Open { .. }) => continue,
                Err(CircuitError::Operation(error)) => {
                    tracing::warn!(
                        provider = entry.provider.name(),
                        error = %error,
                        "provider image call failed"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(CompletionError::AllProvidersFailed { last: last_error })
    }

    /// True when at least one entry's breaker currently allows calls.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.entries.iter().any(|entry| entry.breaker.is_available())
    }

    /// Name of the first entry whose breaker allows calls, `"none"` when
    /// every circuit is open.
    #[must_use]
    pub fn primary_provider(&self) -> &str {
        self.entries
            .iter()
            .find(|entry| entry.breaker.is_available())
            .map_or("none", |entry| entry.provider.name())
    }

    /// Close every registered adapter.
    pub async fn close(&self) {
        for entry in &self.entries {
            entry.provider.close().await;
        }
        tracing::info!("completion client closed");
    }
}

impl Default for FailoverClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedProvider {
        name: &'static str,
        outcomes: Mutex<VecDeque<Result<CompletionResponse, ProviderError>>>,
        calls: AtomicU32,
        closed: AtomicBool,
    }

    impl ScriptedProvider {
        fn new(
            name: &'static str,
            outcomes: Vec<Result<CompletionResponse, ProviderError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicU32::new(0),
                closed: AtomicBool::new(false),
            })
        }

        fn next_outcome(&self) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .expect("outcomes lock")
                .pop_front()
                .unwrap_or_else(|| Ok(response(self.name)))
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _system: Option<&str>,
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<CompletionResponse, ProviderError> {
            self.next_outcome()
        }

        async fn complete_with_image(
            &self,
            _messages: &[ChatMessage],
            _image: &Path,
            _system: Option<&str>,
            _max_tokens: u32,
        ) -> Result<CompletionResponse, ProviderError> {
            self.next_outcome()
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn response(provider: &str) -> CompletionResponse {
        CompletionResponse {
            content: format!("reply from {provider}"),
            model: "test-model".to_string(),
            tokens_used: 10,
            latency_ms: 1.0,
            provider: provider.to_string(),
        }
    }

    fn api_error(body: &str) -> ProviderError {
        ProviderError::Api {
            status: 500,
            body: body.to_string(),
        }
    }

    fn patient_breaker() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(600),
            success_threshold: 2,
        }
    }

    fn touchy_breaker() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 1,
            ..patient_breaker()
        }
    }

    #[tokio::test]
    async fn primary_success_short_circuits() {
        let primary = ScriptedProvider::new("claude", vec![Ok(response("claude"))]);
        let fallback = ScriptedProvider::new("openai", vec![]);

        let mut client = FailoverClient::new();
        client.register(primary.clone(), patient_breaker());
        client.register(fallback.clone(), patient_breaker());

        let reply = client
            .complete(&[ChatMessage::user("hi")], None, 256, 0.7)
            .await
            .expect("completion");

        assert_eq!(reply.provider, "claude");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn failed_primary_falls_back_in_order() {
        let primary = ScriptedProvider::new("claude", vec![Err(api_error("overloaded"))]);
        let fallback = ScriptedProvider::new("openai", vec![Ok(response("openai"))]);

        let mut client = FailoverClient::new();
        client.register(primary.clone(), patient_breaker());
        client.register(fallback.clone(), patient_breaker());

        let reply = client
            .complete(&[ChatMessage::user("hi")], None, 256, 0.7)
            .await
            .expect("completion");

        assert_eq!(reply.provider, "openai");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn open_breaker_entry_is_never_invoked() {
        let primary = ScriptedProvider::new("claude", vec![Err(api_error("down"))]);
        let fallback = ScriptedProvider::new("openai", vec![]);

        let mut client = FailoverClient::new();
        client.register(primary.clone(), touchy_breaker());
        client.register(fallback.clone(), patient_breaker());

        // One failure opens the primary's circuit.
        let first = client
            .complete(&[ChatMessage::user("hi")], None, 256, 0.7)
            .await
            .expect("fallback handles it");
        assert_eq!(first.provider, "openai");
        assert_eq!(primary.calls(), 1);

        // Now the primary is skipped outright.
        let second = client
            .complete(&[ChatMessage::user("hi again")], None, 256, 0.7)
            .await
            .expect("fallback handles it");
        assert_eq!(second.provider, "openai");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_list_reports_last_error() {
        let primary = ScriptedProvider::new("claude", vec![Err(api_error("primary down"))]);
        let fallback = ScriptedProvider::new("openai", vec![Err(api_error("fallback down"))]);

        let mut client = FailoverClient::new();
        client.register(primary, patient_breaker());
        client.register(fallback, patient_breaker());

        let err = client
            .complete(&[ChatMessage::user("hi")], None, 256, 0.7)
            .await
            .expect_err("everything failed");

        let CompletionError::AllProvidersFailed { last } = err;
        let last = last.expect("last error recorded");
        assert!(last.to_string().contains("fallback down"));
    }

    #[tokio::test]
    async fn empty_client_fails_with_no_last_error() {
        let client = FailoverClient::new();
        let err = client
            .complete(&[ChatMessage::user("hi")], None, 256, 0.7)
            .await
            .expect_err("no providers");

        let CompletionError::AllProvidersFailed { last } = err;
        assert!(last.is_none());
    }

    #[tokio::test]
    async fn image_calls_follow_the_same_failover() {
        let primary = ScriptedProvider::new("claude", vec![Err(api_error("no vision today"))]);
        let fallback = ScriptedProvider::new("openai", vec![Ok(response("openai"))]);

        let mut client = FailoverClient::new();
        client.register(primary.clone(), patient_breaker());
        client.register(fallback.clone(), patient_breaker());

        let reply = client
            .complete_with_image(
                &[ChatMessage::user("what is this?")],
                Path::new("/tmp/shot.png"),
                None,
                256,
            )
            .await
            .expect("completion");

        assert_eq!(reply.provider, "openai");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn availability_and_primary_follow_breakers() {
        let primary = ScriptedProvider::new("claude", vec![Err(api_error("down"))]);
        let fallback = ScriptedProvider::new("openai", vec![]);

        let mut client = FailoverClient::new();
        client.register(primary, touchy_breaker());
        client.register(fallback, patient_breaker());

        assert_eq!(client.primary_provider(), "claude");
        let _ = client
            .complete(&[ChatMessage::user("hi")], None, 256, 0.7)
            .await;
        assert_eq!(client.primary_provider(), "openai");
        assert!(client.is_available());
    }

    #[tokio::test]
    async fn close_reaches_every_adapter() {
        let primary = ScriptedProvider::new("claude", vec![]);
        let fallback = ScriptedProvider::new("openai", vec![]);

        let mut client = FailoverClient::new();
        client.register(primary.clone(), patient_breaker());
        client.register(fallback.clone(), patient_breaker());

        client.close().await;
        assert!(primary.closed.load(Ordering::SeqCst));
        assert!(fallback.closed.load(Ordering::SeqCst));
    }
}

//! Inbound/outbound transport seams.
//!
//! The agent never talks to a messenger directly; it consumes a
//! [`MessageSource`] and replies through a [`MessageSink`]. Both are
//! closed by the agent during shutdown, after the completion client.

use async_trait::async_trait;
use thiserror::Error;

use scribe_types::InboundMessage;

/// Outbound delivery failed. Best-effort only for error replies: the
/// agent logs and drops these rather than looping on its own errors.
#[derive(Debug, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Lazy, unbounded sequence of inbound messages.
///
/// `next_message` returning `None` means the stream ended for good;
/// reconnection is the transport's job, not the agent's.
#[async_trait]
pub trait MessageSource: Send {
    async fn next_message(&mut self) -> Option<InboundMessage>;

    /// Graceful close. Idempotent.
    async fn close(&mut self);
}

/// Outbound reply channel.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, text: &str, reply_to: Option<&str>) -> Result<(), DeliveryError>;

    /// Graceful close. Idempotent.
    async fn close(&self);
}

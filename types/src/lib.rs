//! Core domain types for Scribe.
//!
//! This crate holds the plain values shared by every other crate: inbound
//! messages, chat roles, completion responses, the per-message processing
//! context, and skill results. No IO, no async.

mod completion;
mod context;
mod message;
mod skill;

pub use completion::{ChatMessage, CompletionResponse, Role};
pub use context::{MemoryFact, MemoryKind, ProcessingContext};
pub use message::{InboundMessage, MessageKind};
pub use skill::{IdeaSource, IdeaStatus, MemoryUpdate, NewIdea, SkillResult, SkillStatus};

use thiserror::Error;

/// Failed to parse a closed-set enum value from its string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} value '{raw}'; expected one of: {expected:?}")]
pub struct EnumParseError {
    kind: &'static str,
    raw: String,
    expected: &'static [&'static str],
}

impl EnumParseError {
    #[must_use]
    pub fn new(kind: &'static str, raw: impl Into<String>, expected: &'static [&'static str]) -> Self {
        Self {
            kind,
            raw: raw.into(),
            expected,
        }
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

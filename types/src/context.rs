//! Per-message processing context.

use serde::{Deserialize, Serialize};

use crate::completion::ChatMessage;
use crate::message::InboundMessage;
use crate::EnumParseError;

/// Category of a remembered fact about the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Strategy,
    ToneOfVoice,
    Fact,
    Preference,
}

const MEMORY_KIND_VALUES: &[&str] = &["strategy", "tone_of_voice", "fact", "preference"];

impl MemoryKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MemoryKind::Strategy => "strategy",
            MemoryKind::ToneOfVoice => "tone_of_voice",
            MemoryKind::Fact => "fact",
            MemoryKind::Preference => "preference",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, EnumParseError> {
        match raw {
            "strategy" => Ok(MemoryKind::Strategy),
            "tone_of_voice" => Ok(MemoryKind::ToneOfVoice),
            "fact" => Ok(MemoryKind::Fact),
            "preference" => Ok(MemoryKind::Preference),
            other => Err(EnumParseError::new("memory kind", other, MEMORY_KIND_VALUES)),
        }
    }
}

/// A stored fact surfaced into the context for high-importance recall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFact {
    pub kind: MemoryKind,
    pub content: String,
    pub importance: i64,
}

/// Everything one message unit needs to run its pipeline.
///
/// Built once per message, owned by that unit for its whole duration and
/// never shared across units. `history` is chronological (oldest first).
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub user_input: String,
    pub session_id: String,
    pub message: InboundMessage,
    pub memory: Vec<MemoryFact>,
    pub history: Vec<ChatMessage>,
}

impl ProcessingContext {
    /// True when the preprocessed input has any non-whitespace content.
    #[must_use]
    pub fn has_input(&self) -> bool {
        !self.user_input.trim().is_empty()
    }
}

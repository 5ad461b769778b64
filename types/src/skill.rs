//! Skill execution results and the knowledge updates they request.

use serde::{Deserialize, Serialize};

use crate::context::MemoryKind;
use crate::EnumParseError;

/// Outcome class of a skill run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    Success,
    Partial,
    Error,
}

impl SkillStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SkillStatus::Success => "success",
            SkillStatus::Partial => "partial",
            SkillStatus::Error => "error",
        }
    }
}

/// A fact the skill wants persisted to long-term memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub kind: MemoryKind,
    pub content: String,
    pub importance: i64,
}

/// Where a captured idea came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeaSource {
    Voice,
    Screenshot,
    Manual,
    Generated,
}

impl IdeaSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            IdeaSource::Voice => "voice",
            IdeaSource::Screenshot => "screenshot",
            IdeaSource::Manual => "manual",
            IdeaSource::Generated => "generated",
        }
    }
}

/// Lifecycle state of an idea in the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeaStatus {
    New,
    Used,
    Archived,
}

const IDEA_STATUS_VALUES: &[&str] = &["new", "used", "archived"];

impl IdeaStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            IdeaStatus::New => "new",
            IdeaStatus::Used => "used",
            IdeaStatus::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, EnumParseError> {
        match raw {
            "new" => Ok(IdeaStatus::New),
            "used" => Ok(IdeaStatus::Used),
            "archived" => Ok(IdeaStatus::Archived),
            other => Err(EnumParseError::new("idea status", other, IDEA_STATUS_VALUES)),
        }
    }
}

/// An idea a skill wants captured into the bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdea {
    pub content: String,
    pub source: IdeaSource,
    pub tags: Vec<String>,
}

/// Result returned by skill execution.
///
/// `memory_updates` and `ideas` are requests: the agent applies them through
/// storage after output validation, the skill itself never touches storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillResult {
    pub response: String,
    pub status: SkillStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub memory_updates: Vec<MemoryUpdate>,
    #[serde(default)]
    pub ideas: Vec<NewIdea>,
}

impl SkillResult {
    #[must_use]
    pub fn success(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            status: SkillStatus::Success,
            explanation: None,
            memory_updates: Vec::new(),
            ideas: Vec::new(),
        }
    }

    #[must_use]
    pub fn error(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            status: SkillStatus::Error,
            explanation: None,
            memory_updates: Vec::new(),
            ideas: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_idea(mut self, idea: NewIdea) -> Self {
        self.ideas.push(idea);
        self
    }

    #[must_use]
    pub fn with_memory_update(mut self, update: MemoryUpdate) -> Self {
        self.memory_updates.push(update);
        self
    }
}

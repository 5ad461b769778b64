//! Fallback conversational skill.

use async_trait::async_trait;

use scribe_providers::FailoverClient;
use scribe_types::{ChatMessage, ProcessingContext, SkillResult};

use crate::skill::{Skill, SkillError};

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Scribe, a helpful AI assistant for content creators.";

/// How many trailing history turns travel with the request.
const HISTORY_WINDOW: usize = 6;
/// How many memory facts are woven into the system prompt.
const MEMORY_WINDOW: usize = 5;

const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.7;

/// General conversation, used for every message no other skill claims.
///
/// An LLM failure is absorbed here: the unit still completes normally and
/// the user gets the apologetic reply instead of a raw error.
pub struct ChatSkill {
    system_prompt: String,
}

impl ChatSkill {
    #[must_use]
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    #[must_use]
    pub fn with_system_prompt(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    fn build_system(&self, ctx: &ProcessingContext) -> String {
        let mut system = self.system_prompt.clone();
        if !ctx.memory.is_empty() {
            system.push_str("\n\nКонтекст о пользователе:\n");
            for fact in ctx.memory.iter().take(MEMORY_WINDOW) {
                system.push_str(&format!("- [{}] {}\n", fact.kind.as_str(), fact.content));
            }
        }
        system
    }

    fn build_messages(ctx: &ProcessingContext) -> Vec<ChatMessage> {
        let start = ctx.history.len().saturating_sub(HISTORY_WINDOW);
        let mut messages: Vec<ChatMessage> = ctx.history[start..].to_vec();
        messages.push(ChatMessage::user(ctx.user_input.as_str()));
        messages
    }
}

impl Default for ChatSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for ChatSkill {
    fn name(&self) -> &str {
        "chat"
    }

    async fn execute(
        &self,
        ctx: &ProcessingContext,
        client: &FailoverClient,
        request_id: &str,
    ) -> Result<SkillResult, SkillError> {
        let messages = Self::build_messages(ctx);
        let system = self.build_system(ctx);

        let outcome = match &ctx.message.image {
            Some(image) => {
                client
                    .complete_with_image(&messages, image, Some(&system), MAX_TOKENS)
                    .await
            }
            None => {
                client
                    .complete(&messages, Some(&system), MAX_TOKENS, TEMPERATURE)
                    .await
            }
        };

        match outcome {
            Ok(response) => Ok(SkillResult::success(response.content)),
            Err(error) => {
                tracing::error!(error = %error, request_id, "chat skill failed");
                Ok(SkillResult::error(
                    "Извини, что-то пошло не так. Попробуй ещё раз.",
                ))
            }
        }
    }
}

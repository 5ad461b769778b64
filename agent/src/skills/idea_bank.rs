//! Idea capture skill.
//!
//! Deterministic: no completion call is made. The trigger phrase is
//! stripped from the input and the remainder goes to the idea bank as a
//! knowledge update; the agent applies it through storage.

use async_trait::async_trait;

use scribe_providers::FailoverClient;
use scribe_types::{IdeaSource, MessageKind, NewIdea, ProcessingContext, SkillResult};

use crate::skill::{Skill, SkillError};

const TRIGGERS: &[&str] = &["сохрани", "запомни", "идея:", "идеи про"];

/// Captures content ideas from messages like "сохрани идею: ...".
pub struct IdeaBankSkill;

impl IdeaBankSkill {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Strip the leading trigger phrase plus separators from the input,
    /// including the connective in phrases like "сохрани идею: ...".
    fn idea_content(input: &str) -> &str {
        let mut rest = input.trim();
        if let Some(stripped) = strip_prefix_ci(rest, TRIGGERS) {
            rest = stripped;
        }
        if let Some(stripped) = strip_prefix_ci(rest, &["идею", "идея"]) {
            rest = stripped;
        }
        rest
    }

    fn source_for(kind: MessageKind) -> IdeaSource {
        match kind {
            MessageKind::Voice => IdeaSource::Voice,
            MessageKind::Image => IdeaSource::Screenshot,
            MessageKind::Text => IdeaSource::Manual,
        }
    }
}

/// Case-insensitive prefix strip.
///
/// All prefixes are lowercase and map 1:1 under `to_lowercase`, so the
/// matched prefix has the same char count in the original text.
fn strip_prefix_ci<'a>(text: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    let lower = text.to_lowercase();
    for prefix in prefixes {
        if lower.starts_with(prefix) {
            let byte_len: usize = text
                .chars()
                .take(prefix.chars().count())
                .map(char::len_utf8)
                .sum();
            return Some(text[byte_len..].trim_start_matches([' ', ':', ',', '-']).trim_end());
        }
    }
    None
}

impl Default for IdeaBankSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for IdeaBankSkill {
    fn name(&self) -> &str {
        "idea_bank"
    }

    fn triggers(&self) -> &[&str] {
        TRIGGERS
    }

    fn validate_input(&self, ctx: &ProcessingContext) -> bool {
        // The trigger alone carries no idea.
        !Self::idea_content(&ctx.user_input).is_empty()
    }

    async fn execute(
        &self,
        ctx: &ProcessingContext,
        _client: &FailoverClient,
        request_id: &str,
    ) -> Result<SkillResult, SkillError> {
        let content = Self::idea_content(&ctx.user_input).to_string();
        tracing::info!(request_id, "idea captured");

        let reply = format!("💡 Сохранил идею: «{content}»");
        Ok(SkillResult::success(reply).with_idea(NewIdea {
            content,
            source: Self::source_for(ctx.message.kind()),
            tags: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_types::InboundMessage;
    use std::time::SystemTime;

    fn ctx(text: &str) -> ProcessingContext {
        ProcessingContext {
            user_input: text.to_string(),
            session_id: "session_u1".to_string(),
            message: InboundMessage::text("m1", "u1", text, SystemTime::now()),
            memory: Vec::new(),
            history: Vec::new(),
        }
    }

    #[test]
    fn strips_trigger_and_separators() {
        assert_eq!(
            IdeaBankSkill::idea_content("сохрани: пост про фейлы запуска"),
            "пост про фейлы запуска"
        );
        assert_eq!(
            IdeaBankSkill::idea_content("Запомни - тред о пет-проектах"),
            "тред о пет-проектах"
        );
        assert_eq!(
            IdeaBankSkill::idea_content("идея: видео со сборкой"),
            "видео со сборкой"
        );
        assert_eq!(
            IdeaBankSkill::idea_content("сохрани идею: пост про запуск"),
            "пост про запуск"
        );
    }

    #[test]
    fn bare_trigger_fails_validation() {
        let skill = IdeaBankSkill::new();
        assert!(!skill.validate_input(&ctx("сохрани")));
        assert!(!skill.validate_input(&ctx("сохрани идею")));
        assert!(skill.validate_input(&ctx("сохрани идею: пост про запуск")));
    }

    #[tokio::test]
    async fn execute_emits_idea_update_and_confirmation() {
        let skill = IdeaBankSkill::new();
        let client = FailoverClient::new();

        let result = skill
            .execute(&ctx("сохрани идею: пост про запуск"), &client, "m1")
            .await
            .expect("execute");

        assert_eq!(result.ideas.len(), 1);
        assert_eq!(result.ideas[0].content, "пост про запуск");
        assert!(result.response.contains("Сохранил идею"));
    }
}

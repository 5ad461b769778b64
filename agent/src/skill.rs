//! The skill capability contract.

use async_trait::async_trait;
use thiserror::Error;

use scribe_providers::{CompletionError, FailoverClient};
use scribe_types::{ProcessingContext, SkillResult};

/// Hard ceiling on reply length (messenger limit).
pub const MAX_RESPONSE_CHARS: usize = 4000;
const TRUNCATED_KEEP_CHARS: usize = 3900;
const TRUNCATION_MARKER: &str = "\n\n[...сообщение обрезано]";

/// Skill execution failed in a way the skill chose not to absorb.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("{0}")]
    Other(String),
}

/// One capability of the assistant (chat, idea capture, ...).
///
/// Skills are looked up by `name()` from the routing result and run inside
/// exactly one message unit. They receive the completion client and a
/// request id for logging; storage effects travel back as knowledge
/// updates on the [`SkillResult`].
#[async_trait]
pub trait Skill: Send + Sync {
    fn name(&self) -> &str;

    /// Keywords this skill reacts to, for routers that want them.
    fn triggers(&self) -> &[&str] {
        &[]
    }

    /// Whether the input is usable for this skill.
    fn validate_input(&self, ctx: &ProcessingContext) -> bool {
        ctx.has_input()
    }

    async fn execute(
        &self,
        ctx: &ProcessingContext,
        client: &FailoverClient,
        request_id: &str,
    ) -> Result<SkillResult, SkillError>;

    /// Validate and sanitize the produced output.
    fn validate_output(&self, result: SkillResult) -> SkillResult {
        sanitize_response(result)
    }
}

/// Truncate overlong replies, keeping the leading text plus a marker.
#[must_use]
pub fn sanitize_response(result: SkillResult) -> SkillResult {
    if result.response.chars().count() <= MAX_RESPONSE_CHARS {
        return result;
    }

    let mut response: String = result.response.chars().take(TRUNCATED_KEEP_CHARS).collect();
    response.push_str(TRUNCATION_MARKER);
    SkillResult { response, ..result }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_responses_pass_through_untouched() {
        let result = sanitize_response(SkillResult::success("короткий ответ"));
        assert_eq!(result.response, "короткий ответ");
    }

    #[test]
    fn overlong_responses_are_truncated_with_marker() {
        let long = "я".repeat(MAX_RESPONSE_CHARS + 500);
        let result = sanitize_response(SkillResult::success(long));

        assert!(result.response.ends_with(TRUNCATION_MARKER));
        let kept: String = result.response.chars().take(TRUNCATED_KEEP_CHARS).collect();
        assert_eq!(kept, "я".repeat(TRUNCATED_KEEP_CHARS));
        assert_eq!(
            result.response.chars().count(),
            TRUNCATED_KEEP_CHARS + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn exactly_at_limit_is_not_truncated() {
        let at_limit = "ы".repeat(MAX_RESPONSE_CHARS);
        let result = sanitize_response(SkillResult::success(at_limit.clone()));
        assert_eq!(result.response, at_limit);
    }
}

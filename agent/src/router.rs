//! Skill routing.

use scribe_types::ProcessingContext;

/// Name of the conversational fallback skill.
pub const FALLBACK_SKILL: &str = "chat";

/// Decides which skill should handle a message.
pub trait Router: Send + Sync {
    fn route(&self, text: &str, ctx: &ProcessingContext) -> String;
}

/// Deterministic keyword router.
///
/// Categories are checked in table order against the lowercased input;
/// the first category with any matching substring wins. Text matching
/// nothing resolves to the fallback conversational skill.
pub struct KeywordRouter {
    table: Vec<(String, Vec<String>)>,
    fallback: String,
}

impl KeywordRouter {
    #[must_use]
    pub fn new(table: Vec<(String, Vec<String>)>, fallback: impl Into<String>) -> Self {
        Self {
            table,
            fallback: fallback.into(),
        }
    }
}

impl Default for KeywordRouter {
    fn default() -> Self {
        let entry = |skill: &str, keywords: &[&str]| {
            (
                skill.to_string(),
                keywords.iter().map(ToString::to_string).collect(),
            )
        };
        Self::new(
            vec![
                entry(
                    "content_gen",
                    &["напиши", "создай", "пост про", "твит про", "сгенерируй"],
                ),
                entry("idea_bank", &["сохрани", "запомни", "идея:", "идеи про"]),
                entry(
                    "dashboard",
                    &["статистика", "метрики", "как дела", "прогресс"],
                ),
                entry("autopsy", &["разбери", "что не так", "почему не зашло"]),
            ],
            FALLBACK_SKILL,
        )
    }
}

impl Router for KeywordRouter {
    fn route(&self, text: &str, _ctx: &ProcessingContext) -> String {
        let lower = text.to_lowercase();
        for (skill, keywords) in &self.table {
            if keywords.iter().any(|kw| lower.contains(kw.as_str())) {
                return skill.clone();
            }
        }
        self.fallback.clone()
    }
}

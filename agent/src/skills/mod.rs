//! Built-in skills.

mod chat;
mod idea_bank;

pub use chat::ChatSkill;
pub use idea_bank::IdeaBankSkill;

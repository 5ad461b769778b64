//! Agent tuning and environment-driven configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Tunables of the message-processing loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Wall-clock bound on one message's whole pipeline.
    pub message_timeout: Duration,
    /// How long draining waits for live units before cancelling them.
    pub shutdown_grace: Duration,
    /// Recent-history window fetched per message.
    pub history_limit: usize,
    /// Memory facts fetched per message.
    pub memory_limit: usize,
    /// Minimum importance for a fact to surface into the context.
    pub min_importance: i64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            message_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(30),
            history_limit: 10,
            memory_limit: 20,
            min_importance: 5,
        }
    }
}

/// Process-level configuration, read from the environment.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub agent: AgentConfig,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub claude_model: Option<String>,
    pub openai_model: Option<String>,
    /// Database location; the binary falls back to its data directory.
    pub db_path: Option<PathBuf>,
    pub system_prompt_path: Option<PathBuf>,
    pub json_logs: bool,
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            agent: AgentConfig::default(),
            anthropic_api_key: env_non_empty("ANTHROPIC_API_KEY"),
            openai_api_key: env_non_empty("OPENAI_API_KEY"),
            claude_model: env_non_empty("SCRIBE_CLAUDE_MODEL"),
            openai_model: env_non_empty("SCRIBE_OPENAI_MODEL"),
            db_path: env_non_empty("SCRIBE_DB").map(PathBuf::from),
            system_prompt_path: env_non_empty("SCRIBE_SYSTEM_PROMPT").map(PathBuf::from),
            json_logs: env_non_empty("SCRIBE_JSON_LOGS")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

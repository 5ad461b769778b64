//! Scribe - binary entry point.
//!
//! Wires the environment configuration, SQLite store, provider failover
//! chain (Claude primary, OpenAI fallback) and skill registry into the
//! agent, then runs it against the console transport until the inbound
//! stream ends or ctrl-c requests a drain.

mod console;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scribe_agent::{
    skills::{ChatSkill, IdeaBankSkill},
    Agent, Config, Skill,
};
use scribe_providers::{BreakerConfig, ClaudeProvider, FailoverClient, OpenAiProvider};
use scribe_store::Store;

fn init_tracing(json_logs: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scribe")
        .join("scribe.db")
}

fn build_completion_client(config: &Config) -> FailoverClient {
    let mut llm = FailoverClient::new();

    if let Some(key) = &config.anthropic_api_key {
        let model = config
            .claude_model
            .clone()
            .unwrap_or_else(|| ClaudeProvider::DEFAULT_MODEL.to_string());
        llm.register(
            Arc::new(ClaudeProvider::new(key.clone(), model)),
            BreakerConfig::default(),
        );
    }

    if let Some(key) = &config.openai_api_key {
        let model = config
            .openai_model
            .clone()
            .unwrap_or_else(|| OpenAiProvider::DEFAULT_MODEL.to_string());
        llm.register(
            Arc::new(OpenAiProvider::new(key.clone(), model)),
            BreakerConfig::default(),
        );
    }

    if llm.provider_count() == 0 {
        tracing::warn!("no completion providers configured; set ANTHROPIC_API_KEY or OPENAI_API_KEY");
    }

    llm
}

fn build_chat_skill(config: &Config) -> ChatSkill {
    let Some(path) = &config.system_prompt_path else {
        return ChatSkill::new();
    };
    match std::fs::read_to_string(path) {
        Ok(prompt) => ChatSkill::with_system_prompt(prompt),
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to read system prompt, using the default"
            );
            ChatSkill::new()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    init_tracing(config.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "scribe starting");

    let db_path = config.db_path.clone().unwrap_or_else(default_db_path);
    let store = Arc::new(Store::open(&db_path)?);

    let llm = Arc::new(build_completion_client(&config));
    tracing::info!(primary = llm.primary_provider(), "completion client ready");

    let skills: Vec<Arc<dyn Skill>> = vec![
        Arc::new(build_chat_skill(&config)),
        Arc::new(IdeaBankSkill::new()),
    ];

    let agent = Agent::new(
        Box::new(console::ConsoleSource::new()),
        Arc::new(console::ConsoleSink),
        llm,
        store,
        skills,
        config.agent.clone(),
    );

    let shutdown = agent.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => shutdown.shutdown(),
            Err(error) => tracing::error!(error = %error, "failed to listen for ctrl-c"),
        }
    });

    agent.run().await;

    tracing::info!("scribe stopped");
    Ok(())
}

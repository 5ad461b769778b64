//! The concurrent message agent.
//!
//! One unit per inbound message, spawned into a `JoinSet` (the live-set),
//! bounded by a wall-clock timeout and isolated from every other unit: a
//! failing stage resolves to exactly one user-visible reply and nothing
//! escapes to the agent or its siblings.
//!
//! # Shutdown
//!
//! ```text
//! Running → Draining:  first shutdown request (later ones are no-ops)
//! Draining:            no new intake; live units keep running up to the
//!                      grace period, stragglers are cancelled
//! Draining → Stopped:  after resources close (client, sink, source, store)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;

use scribe_providers::FailoverClient;
use scribe_store::{Store, StoreError};
use scribe_types::{InboundMessage, MessageKind, ProcessingContext, Role};

use crate::channel::{DeliveryError, MessageSink, MessageSource};
use crate::config::AgentConfig;
use crate::router::{KeywordRouter, Router, FALLBACK_SKILL};
use crate::skill::{Skill, SkillError};

const TIMEOUT_REPLY: &str = "⏱ Таймаут, попробуй ещё раз";
const FAILURE_REPLY: &str = "❌ Ошибка, попробуй ещё раз";
const NOT_UNDERSTOOD_REPLY: &str = "Не понял запрос. Попробуй переформулировать.";
const NO_HANDLER_REPLY: &str = "Skill not found";

const VOICE_PLACEHOLDER: &str = "[Voice message - transcription pending]";
const IMAGE_PLACEHOLDER: &str = "[Image attached]";

/// Lifecycle state of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Running,
    Draining,
    Stopped,
}

/// Terminal failure of one message unit.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no handler for '{0}' and no fallback registered")]
    HandlerNotFound(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Skill(#[from] SkillError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Cloneable handle that moves the agent Running → Draining exactly once.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Request graceful shutdown. Idempotent.
    pub fn shutdown(&self) {
        if !*self.tx.borrow() {
            tracing::info!("shutdown requested");
            self.tx.send_replace(true);
        }
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Everything a spawned unit needs, shared across all units.
struct Shared {
    llm: Arc<FailoverClient>,
    store: Arc<Store>,
    sink: Arc<dyn MessageSink>,
    skills: HashMap<String, Arc<dyn Skill>>,
    router: Arc<dyn Router>,
    config: AgentConfig,
}

/// The message-processing loop.
pub struct Agent {
    source: Box<dyn MessageSource>,
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    state_tx: watch::Sender<AgentState>,
}

impl Agent {
    pub fn new(
        source: Box<dyn MessageSource>,
        sink: Arc<dyn MessageSink>,
        llm: Arc<FailoverClient>,
        store: Arc<Store>,
        skills: Vec<Arc<dyn Skill>>,
        config: AgentConfig,
    ) -> Self {
        let skills: HashMap<String, Arc<dyn Skill>> = skills
            .into_iter()
            .map(|skill| (skill.name().to_string(), skill))
            .collect();
        let (shutdown_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(AgentState::Running);

        Self {
            source,
            shared: Arc::new(Shared {
                llm,
                store,
                sink,
                skills,
                router: Arc::new(KeywordRouter::default()),
                config,
            }),
            shutdown_tx,
            state_tx,
        }
    }

    /// Replace the default keyword router.
    #[must_use]
    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        let shared = Arc::get_mut(&mut self.shared)
            .expect("router is configured before the agent is started");
        shared.router = router;
        self
    }

    /// Handle for requesting shutdown from outside the loop.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Observe Running → Draining → Stopped transitions.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<AgentState> {
        self.state_tx.subscribe()
    }

    /// Main loop: pull messages, spawn units, drain on shutdown.
    ///
    /// Returns after the inbound stream ends or shutdown completes.
    pub async fn run(mut self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut units: JoinSet<()> = JoinSet::new();

        tracing::info!(
            skills = ?self.shared.skills.keys().collect::<Vec<_>>(),
            "agent started"
        );

        loop {
            tokio::select! {
                // Shutdown first: while draining, no new messages are pulled.
                biased;

                _ = shutdown_rx.wait_for(|stop| *stop) => break,

                // Reap finished units so the live-set stays accurate.
                Some(_) = units.join_next(), if !units.is_empty() => {}

                message = self.source.next_message() => match message {
                    Some(message) => {
                        tracing::debug!(
                            message_id = %message.id,
                            user_id = %message.user_id,
                            live_units = units.len() + 1,
                            "unit spawned"
                        );
                        units.spawn(run_unit(Arc::clone(&self.shared), message));
                    }
                    None => {
                        tracing::info!("inbound stream ended");
                        break;
                    }
                },
            }
        }

        self.drain(units).await;
    }

    async fn drain(&mut self, mut units: JoinSet<()>) {
        self.state_tx.send_replace(AgentState::Draining);
        tracing::info!(pending_units = units.len(), "agent draining");

        let drained = tokio::time::timeout(self.shared.config.shutdown_grace, async {
            while units.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = units.len(),
                "grace period elapsed, cancelling remaining units"
            );
            units.abort_all();
            while units.join_next().await.is_some() {}
        }

        // Close order: completion client, outbound, inbound, storage.
        self.shared.llm.close().await;
        self.shared.sink.close().await;
        self.source.close().await;
        self.shared.store.close().await;

        self.state_tx.send_replace(AgentState::Stopped);
        tracing::info!("agent stopped");
    }
}

/// One message unit: the bounded pipeline plus the error-reply policy.
async fn run_unit(shared: Arc<Shared>, message: InboundMessage) {
    let outcome = tokio::time::timeout(
        shared.config.message_timeout,
        process_message(&shared, &message),
    )
    .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(error @ PipelineError::HandlerNotFound(_))) => {
            tracing::warn!(message_id = %message.id, error = %error, "message failed");
            send_error(&shared, &message, NO_HANDLER_REPLY).await;
        }
        Ok(Err(error)) => {
            tracing::error!(
                message_id = %message.id,
                user_id = %message.user_id,
                error = %error,
                "message failed"
            );
            send_error(&shared, &message, FAILURE_REPLY).await;
        }
        Err(_) => {
            tracing::error!(
                message_id = %message.id,
                user_id = %message.user_id,
                timeout_secs = shared.config.message_timeout.as_secs(),
                "message timed out"
            );
            send_error(&shared, &message, TIMEOUT_REPLY).await;
        }
    }
}

/// The sequential per-message pipeline.
async fn process_message(shared: &Shared, message: &InboundMessage) -> Result<(), PipelineError> {
    let Some(text) = preprocess(message) else {
        tracing::warn!(message_id = %message.id, "empty message text");
        return Ok(());
    };

    let session_id = format!("session_{}", message.user_id);

    let history = shared
        .store
        .fetch_recent_turns(&session_id, shared.config.history_limit)
        .await?;
    let memory = shared
        .store
        .fetch_high_importance_facts(shared.config.min_importance, shared.config.memory_limit)
        .await?;

    let ctx = ProcessingContext {
        user_input: text.clone(),
        session_id: session_id.clone(),
        message: message.clone(),
        memory,
        history,
    };

    let skill_name = shared.router.route(&text, &ctx);
    let skill = match shared.skills.get(&skill_name) {
        Some(skill) => skill,
        None => {
            tracing::warn!(skill = %skill_name, "skill not found, using fallback");
            shared
                .skills
                .get(FALLBACK_SKILL)
                .ok_or_else(|| PipelineError::HandlerNotFound(skill_name.clone()))?
        }
    };
    tracing::info!(message_id = %message.id, skill = skill.name(), "skill selected");

    if !skill.validate_input(&ctx) {
        tracing::warn!(message_id = %message.id, skill = skill.name(), "input validation failed");
        shared
            .sink
            .send(NOT_UNDERSTOOD_REPLY, Some(&message.id))
            .await?;
        return Ok(());
    }

    let result = skill.execute(&ctx, &shared.llm, &message.id).await?;
    let result = skill.validate_output(result);

    shared
        .store
        .append_turn(&session_id, Role::User, &text, message.kind())
        .await?;
    shared
        .store
        .append_turn(&session_id, Role::Assistant, &result.response, MessageKind::Text)
        .await?;

    for update in &result.memory_updates {
        shared.store.record_memory(update).await?;
    }
    for idea in &result.ideas {
        shared.store.add_idea(idea).await?;
    }

    shared.sink.send(&result.response, Some(&message.id)).await?;

    tracing::info!(
        message_id = %message.id,
        skill = skill.name(),
        status = result.status.as_str(),
        "message processed"
    );
    Ok(())
}

/// Turn the raw message into pipeline text.
///
/// Voice and image payloads become placeholders; transcription and image
/// understanding happen further down, in vision-capable skills.
fn preprocess(message: &InboundMessage) -> Option<String> {
    if let Some(text) = &message.text {
        if !text.trim().is_empty() {
            return Some(text.clone());
        }
    }
    if let Some(voice) = &message.voice {
        tracing::debug!(message_id = %message.id, file = %voice.display(), "voice message received");
        return Some(VOICE_PLACEHOLDER.to_string());
    }
    if let Some(image) = &message.image {
        tracing::debug!(message_id = %message.id, file = %image.display(), "image message received");
        return Some(IMAGE_PLACEHOLDER.to_string());
    }
    None
}

/// Best-effort error reply: a delivery failure here is logged and dropped,
/// never re-raised, to avoid error loops.
async fn send_error(shared: &Shared, message: &InboundMessage, text: &str) {
    if let Err(error) = shared.sink.send(text, Some(&message.id)).await {
        tracing::error!(message_id = %message.id, error = %error, "failed to send error reply");
    }
}

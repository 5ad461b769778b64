//! The concurrent message agent.
//!
//! One unit of work per inbound message, bounded by a wall-clock deadline,
//! drained on shutdown. The agent owns the pipeline; skills own the
//! business logic; the failover client owns provider resilience.

mod agent;
mod channel;
mod config;
mod router;
mod skill;
pub mod skills;

pub use agent::{Agent, AgentState, PipelineError, ShutdownHandle};
pub use channel::{DeliveryError, MessageSink, MessageSource};
pub use config::{AgentConfig, Config};
pub use router::{KeywordRouter, Router, FALLBACK_SKILL};
pub use skill::{sanitize_response, Skill, SkillError, MAX_RESPONSE_CHARS};

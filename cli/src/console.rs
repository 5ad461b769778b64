//! Console transport: stdin messages in, stdout replies out.
//!
//! Stands in for the real messenger transport during local operation and
//! development; the agent only ever sees the source/sink seams.

use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use uuid::Uuid;

use scribe_agent::{DeliveryError, MessageSink, MessageSource};
use scribe_types::InboundMessage;

const CONSOLE_USER: &str = "console";

pub struct ConsoleSource {
    lines: Lines<BufReader<Stdin>>,
}

impl ConsoleSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for ConsoleSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSource for ConsoleSource {
    async fn next_message(&mut self) -> Option<InboundMessage> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(InboundMessage::text(
                        format!("console-{}", Uuid::new_v4()),
                        CONSOLE_USER,
                        line,
                        SystemTime::now(),
                    ));
                }
                Ok(None) => return None,
                Err(error) => {
                    tracing::error!(error = %error, "stdin read failed");
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {}
}

pub struct ConsoleSink;

#[async_trait]
impl MessageSink for ConsoleSink {
    async fn send(&self, text: &str, _reply_to: Option<&str>) -> Result<(), DeliveryError> {
        println!("\nScribe: {text}\n");
        Ok(())
    }

    async fn close(&self) {}
}

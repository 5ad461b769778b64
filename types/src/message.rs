//! Inbound message domain model.
//!
//! Constructors take `SystemTime` explicitly; callers own the clock.

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// What kind of payload an inbound message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Voice,
    Image,
}

impl MessageKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Voice => "voice",
            MessageKind::Image => "image",
        }
    }
}

/// One message pulled from the inbound source.
///
/// At most one of `text`, `voice` and `image` is expected to be set; `kind()`
/// reports voice and image payloads ahead of plain text, matching how the
/// transport delivers attachments with an optional caption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub voice: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reply_to: Option<String>,
    pub timestamp: SystemTime,
}

impl InboundMessage {
    /// Plain text message.
    #[must_use]
    pub fn text(
        id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: SystemTime,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            text: Some(text.into()),
            voice: None,
            image: None,
            reply_to: None,
            timestamp,
        }
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        if self.voice.is_some() {
            MessageKind::Voice
        } else if self.image.is_some() {
            MessageKind::Image
        } else {
            MessageKind::Text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_prefers_attachments_over_text() {
        let now = SystemTime::now();
        let mut msg = InboundMessage::text("m1", "u1", "hello", now);
        assert_eq!(msg.kind(), MessageKind::Text);

        msg.image = Some(PathBuf::from("/tmp/shot.png"));
        assert_eq!(msg.kind(), MessageKind::Image);

        msg.voice = Some(PathBuf::from("/tmp/note.ogg"));
        assert_eq!(msg.kind(), MessageKind::Voice);
    }
}

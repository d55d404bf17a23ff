//! Typed representation of a decrypted WeCom message.

use crate::dispatch::DispatchJob;

/// Message kinds the callback acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    /// Any other `MsgType` (voice, video, event, ...)
    Unknown,
}

impl MessageKind {
    /// Map a `MsgType` value. Matching is case-sensitive.
    pub fn from_msg_type(msg_type: &str) -> Self {
        match msg_type {
            "text" => MessageKind::Text,
            "image" => MessageKind::Image,
            _ => MessageKind::Unknown,
        }
    }

    /// Numeric code passed to the downstream handler.
    pub fn type_code(self) -> Option<i32> {
        match self {
            MessageKind::Text => Some(0),
            MessageKind::Image => Some(1),
            MessageKind::Unknown => None,
        }
    }
}

/// A parsed user message.
///
/// `text_content` is set only for [`MessageKind::Text`] and `image_url` only
/// for [`MessageKind::Image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// `FromUserName`, never empty
    pub sender_id: String,
    pub kind: MessageKind,
    pub text_content: Option<String>,
    pub image_url: Option<String>,
}

impl ParsedMessage {
    /// Build the job handed to the dispatcher. Unknown kinds produce none.
    pub fn into_dispatch_job(self, channel_id: i32) -> Option<DispatchJob> {
        let message_type_code = self.kind.type_code()?;
        let content = match self.kind {
            MessageKind::Text => self.text_content?,
            MessageKind::Image => self.image_url?,
            MessageKind::Unknown => return None,
        };

        Some(DispatchJob {
            sender_id: self.sender_id,
            content,
            channel_id,
            message_type_code,
        })
    }
}

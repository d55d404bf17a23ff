//! Dispatch job type.

/// A message ready for the downstream handler.
///
/// Consumed exactly once by a dispatcher worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchJob {
    /// Sender's WeCom user id
    pub sender_id: String,
    /// Text content or image URL
    pub content: String,
    /// Fixed channel identifier
    pub channel_id: i32,
    /// 0 for text, 1 for image
    pub message_type_code: i32,
}

impl DispatchJob {
    /// The handler's four ordered arguments.
    pub fn args(&self) -> [String; 4] {
        [
            self.sender_id.clone(),
            self.content.clone(),
            self.channel_id.to_string(),
            self.message_type_code.to_string(),
        ]
    }
}

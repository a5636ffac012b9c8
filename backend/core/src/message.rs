use serde::{Deserialize, Serialize};

/// One abstract command request normalized from an inbound chat event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub sender_id: String,
    /// Raw message text; absent for attachments, stickers, postbacks and the like.
    #[serde(default)]
    pub text: Option<String>,
}

impl CommandRequest {
    pub fn new(sender_id: impl Into<String>, text: Option<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            text,
        }
    }
}

/// A command request split into its command key and argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub sender_id: String,
    /// Lowercased command key; `None` when the request carried no usable text.
    pub cmd: Option<String>,
    pub tokens: Vec<String>,
}

/// Rendered reply handed to a delivery adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub sender_id: String,
    pub text: String,
}

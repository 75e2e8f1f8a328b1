//! Chat events the conversation consumes and the actions it produces.

use serde::{Deserialize, Serialize};

/// An inbound event for a single chat, already stripped of transport details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A plain text message (commands included).
    Text { message_id: i64, text: String },
    /// An inline keyboard button press.
    Button {
        callback_id: String,
        message_id: Option<i64>,
        data: String,
    },
    /// A compressed photo; `file_id` is the largest available size.
    Photo { message_id: i64, file_id: String },
    /// An uncompressed file upload.
    Document {
        message_id: i64,
        file_id: String,
        mime_type: Option<String>,
    },
}

impl InboundEvent {
    /// The chat message this event originated from, when there is one.
    pub fn message_id(&self) -> Option<i64> {
        match self {
            Self::Text { message_id, .. }
            | Self::Photo { message_id, .. }
            | Self::Document { message_id, .. } => Some(*message_id),
            Self::Button { message_id, .. } => *message_id,
        }
    }
}

/// A single inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Rows of inline buttons.
pub type Keyboard = Vec<Vec<Button>>;

/// Something the conversation wants delivered back to the chat.
///
/// Text is Telegram HTML; delivery degrades it to plain text when the API
/// rejects the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    Send { text: String },
    SendButtons { text: String, keyboard: Keyboard },
    Edit { message_id: i64, text: String },
    Delete { message_id: i64 },
    AnswerButton {
        callback_id: String,
        text: Option<String>,
    },
}

impl OutboundAction {
    pub fn send(text: impl Into<String>) -> Self {
        Self::Send { text: text.into() }
    }

    pub fn buttons(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::SendButtons {
            text: text.into(),
            keyboard,
        }
    }
}

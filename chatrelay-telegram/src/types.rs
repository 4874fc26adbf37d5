//! Telegram Bot API types
//!
//! Only the fields the relay reads; everything else in the JSON is ignored.

use chatrelay_core::{DestinationId, Event};
use serde::Deserialize;

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub chat: Option<Chat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub r#type: String,
}

impl From<Update> for Event {
    fn from(update: Update) -> Self {
        match update.message {
            Some(Message {
                chat: Some(chat),
                text,
                ..
            }) => Self::message(
                update.update_id,
                DestinationId::new(chat.id),
                text.unwrap_or_default(),
            ),
            _ => Self::empty(update.update_id),
        }
    }
}

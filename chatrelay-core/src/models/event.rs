use serde::{Deserialize, Serialize};

use super::DestinationId;

/// One entry fetched from the update source
///
/// `sequence_id` is strictly increasing per source but may have gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub sequence_id: i64,
    /// `None` for updates that carry no chat message (edits, callbacks, ...).
    /// Those still move the cursor forward.
    pub message: Option<InboundMessage>,
}

impl Event {
    #[must_use]
    pub fn message(sequence_id: i64, destination: DestinationId, text: impl Into<String>) -> Self {
        Self {
            sequence_id,
            message: Some(InboundMessage {
                destination,
                text: text.into(),
            }),
        }
    }

    #[must_use]
    pub const fn empty(sequence_id: i64) -> Self {
        Self {
            sequence_id,
            message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub destination: DestinationId,
    pub text: String,
}

/// JSON body published to a destination queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub update_id: i64,
    pub chat_id: i64,
    pub text: String,
}

impl MessagePayload {
    #[must_use]
    pub fn from_event(sequence_id: i64, message: &InboundMessage) -> Self {
        Self {
            update_id: sequence_id,
            chat_id: message.destination.get(),
            text: message.text.clone(),
        }
    }
}

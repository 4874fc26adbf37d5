use bytes::Bytes;

use super::DestinationId;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A message in flight towards the broker
///
/// The body is kept as the exact bytes first published; a retry after a
/// broker return reuses them without re-encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub routing_key: String,
    pub content_type: Option<String>,
    pub body: Bytes,
    /// 0 for the first publish, 1 for the single retry after provisioning
    pub attempt: u32,
}

impl PendingMessage {
    #[must_use]
    pub fn json(destination: DestinationId, body: impl Into<Bytes>) -> Self {
        Self {
            routing_key: destination.routing_key(),
            content_type: Some(CONTENT_TYPE_JSON.to_string()),
            body: body.into(),
            attempt: 0,
        }
    }

    /// The same message, marked as the next delivery attempt
    #[must_use]
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn destination(&self) -> Option<DestinationId> {
        DestinationId::from_routing_key(&self.routing_key)
    }
}

/// A mandatory publish the broker could not route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnedMessage {
    pub message: PendingMessage,
    pub reply_code: u16,
    pub reply_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_keeps_body() {
        let original = PendingMessage::json(DestinationId::new(7), &b"{\"text\":\"hi\"}"[..]);
        let retry = original.retry();

        assert_eq!(retry.attempt, 1);
        assert_eq!(retry.body, original.body);
        assert_eq!(retry.routing_key, "chat_7");
        assert_eq!(retry.content_type.as_deref(), Some(CONTENT_TYPE_JSON));
        assert_eq!(retry.destination(), Some(DestinationId::new(7)));
    }
}

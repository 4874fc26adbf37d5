// Relay seams
//
// The polling loop only knows these two interfaces; the Telegram client and
// the AMQP publisher live in their own crates.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::models::{DestinationId, Event};
use crate::Result;

/// Long-poll source of ordered events
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch events with `sequence_id >= cursor`, blocking up to `timeout`
    /// when none are available yet. A timeout yields an empty batch, not an
    /// error.
    async fn fetch(&self, cursor: i64, timeout: Duration) -> Result<Vec<Event>>;
}

/// Sink for relayed message bodies
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Hand `body` to the broker for the destination's queue.
    ///
    /// Resolves once the broker has accepted the message for routing; a
    /// missing destination is reported asynchronously, not here.
    async fn publish(&self, destination: DestinationId, body: Bytes) -> Result<()>;
}

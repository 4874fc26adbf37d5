use async_trait::async_trait;
use chatrelay_core::PendingMessage;

use crate::Result;

/// Raw broker operations the relay needs
///
/// Implementations are driven from the single publisher task, so they need
/// not serialize concurrent callers themselves. Messages the broker cannot
/// route are not reported here; they come back on the returns stream the
/// implementation hands out when it is created.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Publish with mandatory delivery to the default exchange, using
    /// `message.routing_key` as the queue name. Resolves once the broker has
    /// accepted the frame.
    async fn publish(&self, message: &PendingMessage) -> Result<()>;

    /// Declare a durable queue. Declaring an existing queue with the same
    /// arguments succeeds without changing it.
    async fn declare_destination(&self, queue: &str) -> Result<()>;
}

//! Publisher owner task
//!
//! Every broker write (relay publishes, return-handler retries and queue
//! declares) goes through one task that owns the [`BrokerChannel`]. Callers
//! hold cheap [`Publisher`] handles and await a oneshot reply, so commands
//! reach the channel one at a time in the order they were queued.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chatrelay_core::{DestinationId, EventPublisher, PendingMessage};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::{BrokerChannel, Error, Result};

enum Command {
    Publish {
        message: PendingMessage,
        reply: oneshot::Sender<Result<()>>,
    },
    Declare {
        queue: String,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to the publisher task
///
/// The task stops once every handle has been dropped.
#[derive(Clone)]
pub struct Publisher {
    commands: mpsc::Sender<Command>,
}

impl Publisher {
    /// Spawn the owner task for `channel`
    pub fn spawn(channel: Arc<dyn BrokerChannel>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_publisher(channel, command_rx));
        (Self { commands }, handle)
    }

    /// Publish an already built message with mandatory delivery
    pub async fn send(&self, message: PendingMessage) -> Result<()> {
        self.request(|reply| Command::Publish { message, reply }).await
    }

    /// Declare a durable queue through the same task
    pub async fn declare(&self, queue: &str) -> Result<()> {
        let queue = queue.to_string();
        self.request(|reply| Command::Declare { queue, reply }).await
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<()>>) -> Command,
    ) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        response.await.map_err(|_| Error::ChannelClosed)?
    }
}

#[async_trait]
impl EventPublisher for Publisher {
    async fn publish(&self, destination: DestinationId, body: Bytes) -> chatrelay_core::Result<()> {
        self.send(PendingMessage::json(destination, body))
            .await
            .map_err(Into::into)
    }
}

async fn run_publisher(channel: Arc<dyn BrokerChannel>, mut commands: mpsc::Receiver<Command>) {
    info!("Publisher task started");

    while let Some(command) = commands.recv().await {
        match command {
            Command::Publish { message, reply } => {
                let result = channel.publish(&message).await;
                match &result {
                    Ok(()) => debug!(
                        routing_key = %message.routing_key,
                        attempt = message.attempt,
                        bytes = message.body.len(),
                        "Message accepted by broker"
                    ),
                    Err(e) => error!(
                        error = %e,
                        routing_key = %message.routing_key,
                        "Broker rejected publish"
                    ),
                }
                // The caller may have given up waiting
                let _ = reply.send(result);
            }
            Command::Declare { queue, reply } => {
                let result = channel.declare_destination(&queue).await;
                if let Err(e) = &result {
                    error!(error = %e, queue = %queue, "Queue declare failed");
                }
                let _ = reply.send(result);
            }
        }
    }

    info!("Publisher task stopped, all handles dropped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBroker;

    #[tokio::test]
    async fn test_publish_and_declare_through_task() {
        let (broker, _returns) = MemoryBroker::new();
        let (publisher, handle) = Publisher::spawn(broker.clone(), 8);

        publisher.declare("chat_5").await.unwrap();
        EventPublisher::publish(&publisher, DestinationId::new(5), Bytes::from_static(b"{}"))
            .await
            .unwrap();

        assert_eq!(broker.declares(), vec!["chat_5".to_string()]);
        let delivered = broker.queue("chat_5");
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].attempt, 0);
        assert_eq!(delivered[0].content_type.as_deref(), Some("application/json"));

        drop(publisher);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_broker_error_reported_to_caller() {
        let (broker, _returns) = MemoryBroker::new();
        broker.set_fail_publish(true);
        let (publisher, _handle) = Publisher::spawn(broker.clone(), 8);

        let err = publisher
            .send(PendingMessage::json(DestinationId::new(1), &b"x"[..]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Broker(_)));
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_handles_are_serialized() {
        let (broker, _returns) = MemoryBroker::new();
        broker.create_queue("chat_1");
        let (publisher, _handle) = Publisher::spawn(broker.clone(), 2);

        let mut tasks = Vec::new();
        for i in 0..20u8 {
            let publisher = publisher.clone();
            tasks.push(tokio::spawn(async move {
                publisher
                    .send(PendingMessage::json(DestinationId::new(1), vec![i]))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(broker.queue("chat_1").len(), 20);
    }
}

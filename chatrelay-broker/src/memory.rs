//! In-process test broker
//!
//! Routes mandatory publishes to queues that exist and returns the rest,
//! like the default exchange of a real broker. The unit and integration
//! tests use it in place of RabbitMQ.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chatrelay_core::{PendingMessage, ReturnedMessage};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{BrokerChannel, Error, Result};

/// AMQP reply code for an unroutable mandatory publish
pub const NO_ROUTE: u16 = 312;

#[derive(Default)]
struct State {
    queues: HashMap<String, Vec<PendingMessage>>,
    published: Vec<PendingMessage>,
    declares: Vec<String>,
    fail_publish: bool,
    fail_declare: bool,
    ignore_declares: bool,
}

pub struct MemoryBroker {
    state: Mutex<State>,
    returns: Mutex<Option<mpsc::UnboundedSender<ReturnedMessage>>>,
}

impl MemoryBroker {
    /// Create a broker and the stream of messages it returns
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ReturnedMessage>) {
        let (returns_tx, returns_rx) = mpsc::unbounded_channel();
        let broker = Self {
            state: Mutex::new(State::default()),
            returns: Mutex::new(Some(returns_tx)),
        };
        (Arc::new(broker), returns_rx)
    }

    /// Pre-create a queue
    pub fn create_queue(&self, queue: &str) {
        self.state.lock().queues.entry(queue.to_string()).or_default();
    }

    /// Make every publish fail as a dropped connection would
    pub fn set_fail_publish(&self, fail: bool) {
        self.state.lock().fail_publish = fail;
    }

    pub fn set_fail_declare(&self, fail: bool) {
        self.state.lock().fail_declare = fail;
    }

    /// Declares succeed without creating anything, as if another client
    /// deleted the queue straight after
    pub fn set_ignore_declares(&self, ignore: bool) {
        self.state.lock().ignore_declares = ignore;
    }

    /// Messages delivered to `queue`, in arrival order
    #[must_use]
    pub fn queue(&self, queue: &str) -> Vec<PendingMessage> {
        self.state.lock().queues.get(queue).cloned().unwrap_or_default()
    }

    /// Every publish accepted, routed or not
    #[must_use]
    pub fn published(&self) -> Vec<PendingMessage> {
        self.state.lock().published.clone()
    }

    /// Every queue declare, including repeats
    #[must_use]
    pub fn declares(&self) -> Vec<String> {
        self.state.lock().declares.clone()
    }

    /// Close the returns stream
    pub fn close(&self) {
        self.returns.lock().take();
    }
}

#[async_trait]
impl BrokerChannel for MemoryBroker {
    async fn publish(&self, message: &PendingMessage) -> Result<()> {
        let returned = {
            let mut state = self.state.lock();
            if state.fail_publish {
                return Err(Error::Broker("connection reset by peer".to_string()));
            }
            state.published.push(message.clone());
            match state.queues.get_mut(&message.routing_key) {
                Some(queue) => {
                    queue.push(message.clone());
                    None
                }
                None => Some(ReturnedMessage {
                    message: message.clone(),
                    reply_code: NO_ROUTE,
                    reply_text: "NO_ROUTE".to_string(),
                }),
            }
        };

        if let Some(returned) = returned {
            if let Some(returns) = self.returns.lock().as_ref() {
                let _ = returns.send(returned);
            }
        }
        Ok(())
    }

    async fn declare_destination(&self, queue: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_declare {
            return Err(Error::Broker(format!("access refused for {queue}")));
        }
        state.declares.push(queue.to_string());
        if !state.ignore_declares {
            state.queues.entry(queue.to_string()).or_default();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_core::DestinationId;

    #[tokio::test]
    async fn test_unroutable_publish_is_returned() {
        let (broker, mut returns) = MemoryBroker::new();
        let message = PendingMessage::json(DestinationId::new(1), &b"x"[..]);

        broker.publish(&message).await.unwrap();

        let returned = returns.recv().await.unwrap();
        assert_eq!(returned.message, message);
        assert_eq!(returned.reply_code, NO_ROUTE);
        assert!(broker.queue("chat_1").is_empty());
    }

    #[tokio::test]
    async fn test_routed_after_declare() {
        let (broker, mut returns) = MemoryBroker::new();
        let message = PendingMessage::json(DestinationId::new(1), &b"x"[..]);

        broker.declare_destination("chat_1").await.unwrap();
        broker.publish(&message).await.unwrap();

        assert_eq!(broker.queue("chat_1"), vec![message]);
        broker.close();
        assert!(returns.recv().await.is_none());
    }
}

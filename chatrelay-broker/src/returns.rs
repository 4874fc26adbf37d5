//! Return handler
//!
//! Consumes messages the broker could not route, provisions the missing
//! destination and publishes the same bytes once more. A retry that comes
//! back again is dropped, so each original publish costs at most one extra
//! round trip.

use chatrelay_core::{DestinationId, PendingMessage, ReturnedMessage};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{Error, Provisioner, Publisher, Result};

/// Attempts after which a returned message is no longer retried
pub const MAX_RETRIES: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnStats {
    pub received: u64,
    pub retried: u64,
    pub dropped: u64,
}

pub struct ReturnHandler {
    provisioner: Provisioner,
    publisher: Publisher,
    returns: mpsc::UnboundedReceiver<ReturnedMessage>,
    stats: ReturnStats,
}

impl ReturnHandler {
    #[must_use]
    pub fn new(
        provisioner: Provisioner,
        publisher: Publisher,
        returns: mpsc::UnboundedReceiver<ReturnedMessage>,
    ) -> Self {
        Self {
            provisioner,
            publisher,
            returns,
            stats: ReturnStats::default(),
        }
    }

    #[must_use]
    pub const fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    #[must_use]
    pub const fn stats(&self) -> ReturnStats {
        self.stats
    }

    /// Process returns in arrival order until the stream closes
    ///
    /// The stream closes when the broker connection does; there is no
    /// separate stop signal.
    pub async fn run(&mut self) -> ReturnStats {
        info!("Return handler started");

        while let Some(returned) = self.returns.recv().await {
            self.handle(returned).await;
        }

        info!(
            received = self.stats.received,
            retried = self.stats.retried,
            dropped = self.stats.dropped,
            "Return handler stopped, returns stream closed"
        );
        self.stats
    }

    async fn handle(&mut self, returned: ReturnedMessage) {
        self.stats.received += 1;
        let ReturnedMessage {
            message,
            reply_code,
            reply_text,
        } = returned;

        info!(
            routing_key = %message.routing_key,
            reply_code,
            reply_text = %reply_text,
            attempt = message.attempt,
            "Message returned by broker"
        );

        let destination = match parse_destination(&message) {
            Ok(destination) => destination,
            Err(e) => {
                warn!(error = %e, "Returned message had unexpected routing key, dropping");
                self.stats.dropped += 1;
                return;
            }
        };

        if message.attempt >= MAX_RETRIES {
            warn!(
                routing_key = %message.routing_key,
                attempt = message.attempt,
                "Retried message returned again, dropping"
            );
            self.stats.dropped += 1;
            return;
        }

        match self.provisioner.ensure(destination).await {
            Ok(outcome) => debug!(destination = %destination, ?outcome, "Destination ready"),
            Err(e) => {
                error!(error = %e, destination = %destination, "Failed to declare queue for returned message, dropping");
                self.stats.dropped += 1;
                return;
            }
        }

        self.republish(&message).await;
    }

    async fn republish(&mut self, message: &PendingMessage) {
        match self.publisher.send(message.retry()).await {
            Ok(()) => {
                self.stats.retried += 1;
                info!(routing_key = %message.routing_key, "Re-published returned message");
            }
            Err(e) => {
                self.stats.dropped += 1;
                error!(
                    error = %e,
                    routing_key = %message.routing_key,
                    "Failed to re-publish message after queue declaration"
                );
            }
        }
    }
}

fn parse_destination(message: &PendingMessage) -> Result<DestinationId> {
    message
        .destination()
        .ok_or_else(|| Error::InvalidRoutingKey(message.routing_key.clone()))
}
